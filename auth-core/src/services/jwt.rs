use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AuthError;
use crate::services::Clock;

/// Issues and verifies signed credential pairs.
///
/// Access and refresh tokens share one claim layout and one signing key;
/// they differ only in lifetime. Every token gets its own `jti`, so two
/// pairs issued for one user at the same instant never collide.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_timeout_minutes: i64,
    refresh_token_timeout_minutes: i64,
    clock: Arc<dyn Clock>,
}

/// Claims carried by both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User ID
    pub user_id: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token ID
    #[serde(default)]
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenService {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        if config.secret_key.is_empty() {
            return Err(AuthError::Configuration(
                "JWT secret key is not set".to_string(),
            ));
        }

        if !matches!(
            config.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Configuration(format!(
                "Unsupported token algorithm {:?}",
                config.algorithm
            )));
        }

        tracing::info!(algorithm = ?config.algorithm, "Token service initialized");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            algorithm: config.algorithm,
            access_token_timeout_minutes: config.access_token_timeout_minutes,
            refresh_token_timeout_minutes: config.refresh_token_timeout_minutes,
            clock,
        })
    }

    /// Issue an access/refresh pair for a user, both stamped from the same instant.
    pub fn issue(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        let user_id = user_id.to_string();

        let access_token = self.encode(&user_id, now, self.access_token_timeout_minutes)?;
        let refresh_token = self.encode(&user_id, now, self.refresh_token_timeout_minutes)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn encode(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        timeout_minutes: i64,
    ) -> Result<String, AuthError> {
        let claims = TokenClaims {
            user_id: user_id.to_string(),
            exp: (now + Duration::minutes(timeout_minutes)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Verify signature and expiry of a token.
    ///
    /// Expiry is checked against the injected clock with no leeway; a token
    /// is expired once `exp <= now`. Every other failure is `CredentialsInvalid`.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token decode failed");
                AuthError::CredentialsInvalid
            })?;

        if token_data.claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::CredentialsExpired);
        }

        Ok(token_data.claims)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn access_token_timeout_minutes(&self) -> i64 {
        self.access_token_timeout_minutes
    }

    pub fn refresh_token_timeout_minutes(&self) -> i64 {
        self.refresh_token_timeout_minutes
    }
}
