//! Credential verification engines.
//!
//! An engine turns a client's raw credentials into a signed token pair. Each
//! engine is registered under a lowercase identity; a request names the
//! engine it wants and the registry builds it around the request's storage
//! session.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AuthError;
use crate::models::User;
use crate::services::{PasswordService, StorageSession, TokenService};

pub mod email;

pub use email::EmailAuthEngine;

/// Engine-specific credential payload.
pub type Credentials = serde_json::Map<String, Value>;

/// Result of a successful `authenticate`.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Stateless services an engine drives.
#[derive(Clone, Copy)]
pub struct EngineServices<'a> {
    pub tokens: &'a TokenService,
    pub passwords: &'a PasswordService,
}

#[async_trait]
pub trait AuthEngine: Send {
    fn identity(&self) -> &'static str;

    async fn authenticate(&mut self, _credentials: &Credentials) -> Result<Authenticated, AuthError> {
        Err(AuthError::not_implemented("Authenticate", self.identity()))
    }

    async fn register_user(&mut self, _credentials: &Credentials) -> Result<User, AuthError> {
        Err(AuthError::not_implemented("Register", self.identity()))
    }

    async fn resend_confirm(&mut self, _user: &User) -> Result<(), AuthError> {
        Err(AuthError::not_allowed("Resend confirm", self.identity()))
    }

    async fn confirm(&mut self, _credentials: &Credentials) -> Result<User, AuthError> {
        Err(AuthError::not_allowed("Confirm", self.identity()))
    }

    async fn restore_request(&mut self, _credentials: &Credentials) -> Result<(), AuthError> {
        Err(AuthError::not_allowed("Restore request", self.identity()))
    }

    async fn restore_confirm(&mut self, _credentials: &Credentials) -> Result<User, AuthError> {
        Err(AuthError::not_allowed("Restore confirm", self.identity()))
    }

    /// Whether the user's stored credentials can be used with this engine.
    fn bounded(&self, _user: &User) -> Result<bool, AuthError> {
        Err(AuthError::not_implemented("Bounded", self.identity()))
    }
}

/// Builds an engine around a storage session. `None` means no storage was
/// wired, which is a configuration error.
pub type EngineFactory = for<'a> fn(
    Option<&'a mut dyn StorageSession>,
    EngineServices<'a>,
) -> Result<Box<dyn AuthEngine + 'a>, AuthError>;

pub const ENGINES: &[(&str, EngineFactory)] = &[(email::IDENTITY, email::email_engine)];

/// Look up an engine constructor by identity, case-insensitively.
///
/// Touches no storage, so callers can reject unknown engines before opening
/// a session.
pub fn engine_factory(identity: &str) -> Result<EngineFactory, AuthError> {
    let key = identity.to_lowercase();
    ENGINES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| {
            tracing::info!(engine = %identity, "Unknown auth engine requested");
            AuthError::InvalidParam(format!("Unknown auth engine='{}'", identity))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_case_insensitive() {
        assert!(engine_factory("email").is_ok());
        assert!(engine_factory("EMAIL").is_ok());
    }

    #[test]
    fn test_unknown_engine_is_invalid_param() {
        match engine_factory("sms") {
            Err(AuthError::InvalidParam(message)) => {
                assert_eq!(message, "Unknown auth engine='sms'")
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("sms engine should not be registered"),
        }
    }

    #[test]
    fn test_registered_identities_are_lowercase() {
        for (name, _) in ENGINES {
            assert_eq!(*name, name.to_lowercase());
        }
    }
}
