use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{AuthEngine, Authenticated, Credentials, EngineServices};
use crate::error::AuthError;
use crate::models::{RefreshToken, User};
use crate::services::StorageSession;
use crate::utils::Password;

pub const IDENTITY: &str = "email";

#[derive(Deserialize)]
struct EmailCredentials {
    email: String,
    password: String,
}

/// Email and password authentication.
pub struct EmailAuthEngine<'a> {
    session: &'a mut dyn StorageSession,
    services: EngineServices<'a>,
}

impl<'a> EmailAuthEngine<'a> {
    pub fn new(
        session: Option<&'a mut dyn StorageSession>,
        services: EngineServices<'a>,
    ) -> Result<Self, AuthError> {
        match session {
            Some(session) if session.is_active() => Ok(Self { session, services }),
            _ => {
                tracing::warn!(engine = IDENTITY, "Auth engine built without a live storage session");
                Err(AuthError::Configuration(
                    "Auth engine requires an open storage session".to_string(),
                ))
            }
        }
    }
}

/// Registry constructor for [`EmailAuthEngine`].
pub fn email_engine<'a>(
    session: Option<&'a mut dyn StorageSession>,
    services: EngineServices<'a>,
) -> Result<Box<dyn AuthEngine + 'a>, AuthError> {
    Ok(Box::new(EmailAuthEngine::new(session, services)?))
}

#[async_trait]
impl<'a> AuthEngine for EmailAuthEngine<'a> {
    fn identity(&self) -> &'static str {
        IDENTITY
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<Authenticated, AuthError> {
        let EmailCredentials { email, password } =
            serde_json::from_value(Value::Object(credentials.clone())).map_err(|e| {
                AuthError::InvalidParam(format!("Invalid credentials for engine '{}': {}", IDENTITY, e))
            })?;
        let email = email.trim().to_lowercase();
        let password = Password::new(password);

        let Some(mut user) = self.session.find_user_by_email(&email).await? else {
            self.services.passwords.verify_decoy(&password);
            tracing::info!(engine = IDENTITY, reason = "unknown_email", "Authentication failed");
            return Err(AuthError::InvalidCredentials);
        };

        if !user
            .check_password(&password, self.services.passwords, &mut *self.session)
            .await
        {
            tracing::info!(
                engine = IDENTITY,
                user_id = %user.user_id,
                reason = "password_mismatch",
                "Authentication failed"
            );
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self.services.tokens.issue(user.user_id)?;
        let record = RefreshToken::new(
            pair.refresh_token.clone(),
            user.user_id,
            self.services.tokens.now(),
        );
        self.session.insert_refresh_token(&record).await?;

        tracing::info!(engine = IDENTITY, user_id = %user.user_id, "User authenticated");

        Ok(Authenticated {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user,
        })
    }

    fn bounded(&self, user: &User) -> Result<bool, AuthError> {
        Ok(user.email.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserType;
    use crate::services::{MemoryStorage, Storage};
    use crate::test_support::{confirmed, password_service, token_service};
    use chrono::Utc;
    use serde_json::json;

    fn credentials(value: Value) -> Credentials {
        match value {
            Value::Object(map) => map,
            other => panic!("credentials must be an object, got {}", other),
        }
    }

    struct Fixture {
        storage: MemoryStorage,
        user: User,
        passwords: crate::services::PasswordService,
        tokens: crate::services::TokenService,
    }

    fn fixture() -> Fixture {
        let storage = MemoryStorage::new();
        let passwords = password_service();
        let (tokens, _) = token_service(Utc::now());

        let mut user = confirmed(User::new(UserType::Operator));
        user.set_email(Some("operator@example.com")).expect("email");
        user.set_password(&Password::new("violet-harbor-42"), &passwords)
            .expect("password");
        storage.insert_user(user.clone());

        Fixture {
            storage,
            user,
            passwords,
            tokens,
        }
    }

    #[tokio::test]
    async fn test_authenticate_issues_pair_and_persists_refresh_token() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        let mut session = f.storage.begin().await.expect("session");

        let result = {
            let mut engine = EmailAuthEngine::new(Some(session.as_mut()), services).expect("engine");
            engine
                .authenticate(&credentials(json!({
                    "email": "Operator@Example.com",
                    "password": "violet-harbor-42"
                })))
                .await
                .expect("authenticated")
        };
        session.commit().await.expect("commit");

        let claims = f.tokens.verify(&result.access_token).expect("claims");
        assert_eq!(claims.user_id, f.user.user_id.to_string());
        assert_eq!(result.user.user_id, f.user.user_id);

        let records = f.storage.refresh_tokens();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, result.refresh_token);
        assert_eq!(records[0].user_id, f.user.user_id);
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_fail_identically() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        let mut session = f.storage.begin().await.expect("session");
        let mut engine = EmailAuthEngine::new(Some(session.as_mut()), services).expect("engine");

        let unknown = engine
            .authenticate(&credentials(json!({
                "email": "nobody@example.com",
                "password": "violet-harbor-42"
            })))
            .await
            .expect_err("unknown email");
        let wrong = engine
            .authenticate(&credentials(json!({
                "email": "operator@example.com",
                "password": "not-the-password"
            })))
            .await
            .expect_err("wrong password");

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
        drop(engine);
        assert!(f.storage.refresh_tokens().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_email_still_spends_a_password_verification() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        let mut session = f.storage.begin().await.expect("session");
        let mut engine = EmailAuthEngine::new(Some(session.as_mut()), services).expect("engine");
        assert!(!f.passwords.has_decoy());

        let err = engine
            .authenticate(&credentials(json!({
                "email": "nobody@example.com",
                "password": "violet-harbor-42"
            })))
            .await
            .expect_err("unknown email");

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(f.passwords.has_decoy());
    }

    #[tokio::test]
    async fn test_malformed_credentials_are_invalid_param() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        let mut session = f.storage.begin().await.expect("session");
        let mut engine = EmailAuthEngine::new(Some(session.as_mut()), services).expect("engine");

        let err = engine
            .authenticate(&credentials(json!({ "email": "operator@example.com" })))
            .await
            .expect_err("missing password");
        assert!(matches!(err, AuthError::InvalidParam(_)));
    }

    #[tokio::test]
    async fn test_missing_or_closed_session_is_configuration_error() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        assert!(matches!(
            EmailAuthEngine::new(None, services),
            Err(AuthError::Configuration(_))
        ));

        let mut session = f.storage.begin().await.expect("session");
        session.rollback().await.expect("rollback");
        assert!(matches!(
            EmailAuthEngine::new(Some(session.as_mut()), services),
            Err(AuthError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_and_unrealized_capabilities() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        let mut session = f.storage.begin().await.expect("session");
        let mut engine = email_engine(Some(session.as_mut()), services).expect("engine");
        let empty = Credentials::new();

        assert!(matches!(
            engine.register_user(&empty).await,
            Err(AuthError::NotImplemented { .. })
        ));
        assert!(matches!(
            engine.confirm(&empty).await,
            Err(AuthError::NotAllowed { .. })
        ));
        assert!(matches!(
            engine.resend_confirm(&f.user).await,
            Err(AuthError::NotAllowed { .. })
        ));
        assert!(matches!(
            engine.restore_request(&empty).await,
            Err(AuthError::NotAllowed { .. })
        ));
        assert!(matches!(
            engine.restore_confirm(&empty).await,
            Err(AuthError::NotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn test_bounded_reports_email_presence() {
        let f = fixture();
        let services = EngineServices {
            tokens: &f.tokens,
            passwords: &f.passwords,
        };
        let mut session = f.storage.begin().await.expect("session");
        let engine = EmailAuthEngine::new(Some(session.as_mut()), services).expect("engine");

        assert_eq!(engine.bounded(&f.user).ok(), Some(true));
        assert_eq!(
            engine.bounded(&User::new(UserType::Operator)).ok(),
            Some(false)
        );
    }
}
