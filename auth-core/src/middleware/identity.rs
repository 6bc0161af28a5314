//! Per-request caller identity, resolved lazily.
//!
//! Resolution runs in four stages: the raw token from the `X-Auth-Token`
//! header, the verified claims, the user id carried in the claims, and the
//! stored user. Each stage is computed on first access and cached for the
//! rest of the request. A failed stage is not cached, and its error surfaces
//! only to the caller that asked for it.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, HeaderValue},
};
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::User;
use crate::services::{StorageSession, TokenClaims, TokenService};
use crate::AppState;

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

pub struct RequestIdentity {
    tokens: TokenService,
    header: Option<HeaderValue>,
    raw_token: Option<Option<String>>,
    payload: Option<TokenClaims>,
    user_id: Option<Uuid>,
    user: Option<User>,
}

fn read_token(header: &Option<HeaderValue>) -> Option<String> {
    header
        .as_ref()
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl RequestIdentity {
    pub fn new(tokens: TokenService, header: Option<HeaderValue>) -> Self {
        Self {
            tokens,
            header,
            raw_token: None,
            payload: None,
            user_id: None,
            user: None,
        }
    }

    pub fn from_headers(tokens: TokenService, headers: &HeaderMap) -> Self {
        Self::new(tokens, headers.get(AUTH_TOKEN_HEADER).cloned())
    }

    /// Token from the request header. A missing header is not an error.
    pub fn raw_token(&mut self) -> Option<&str> {
        let header = &self.header;
        self.raw_token
            .get_or_insert_with(|| read_token(header))
            .as_deref()
    }

    /// Verified claims. Fails with `CredentialsInvalid` when no token was sent.
    pub fn payload(&mut self) -> Result<&TokenClaims, AuthError> {
        let claims = match self.payload.take() {
            Some(claims) => claims,
            None => {
                let token = self
                    .raw_token()
                    .map(str::to_owned)
                    .ok_or(AuthError::CredentialsInvalid)?;
                self.tokens.verify(&token)?
            }
        };
        Ok(self.payload.insert(claims))
    }

    pub fn user_id(&mut self) -> Result<Uuid, AuthError> {
        if let Some(user_id) = self.user_id {
            return Ok(user_id);
        }

        let user_id = Uuid::parse_str(&self.payload()?.user_id).map_err(|e| {
            tracing::debug!(error = %e, "Token user_id is not a UUID");
            AuthError::CredentialsInvalid
        })?;
        self.user_id = Some(user_id);
        Ok(user_id)
    }

    /// Stored user behind the token. A token for a user that no longer
    /// exists fails with `InvalidCredentials`.
    pub async fn user(&mut self, session: &mut dyn StorageSession) -> Result<&User, AuthError> {
        let user = match self.user.take() {
            Some(user) => user,
            None => {
                let user_id = self.user_id()?;
                match session.find_user_by_id(user_id).await? {
                    Some(user) => user,
                    None => {
                        tracing::info!(user_id = %user_id, "Token refers to an unknown user");
                        return Err(AuthError::InvalidCredentials);
                    }
                }
            }
        };
        Ok(self.user.insert(user))
    }

    /// Replace the raw token and drop every stage derived from it.
    pub fn set_raw_token(&mut self, token: Option<String>) {
        self.raw_token = Some(token);
        self.payload = None;
        self.user_id = None;
        self.user = None;
    }

    pub fn set_payload(&mut self, claims: TokenClaims) {
        self.payload = Some(claims);
        self.user_id = None;
        self.user = None;
    }

    pub fn set_user(&mut self, user: User) {
        self.user_id = Some(user.user_id);
        self.user = Some(user);
    }

    /// Pre-seed the identity of a request that has just authenticated.
    pub fn seed_authenticated(&mut self, access_token: String, user: User) {
        self.set_raw_token(Some(access_token));
        self.set_user(user);
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(Self::from_headers(state.tokens.clone(), &parts.headers))
    }
}
