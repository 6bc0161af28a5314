use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::User;
use crate::services::policy::{DefaultPasswordPolicy, PasswordPolicy};
use crate::utils::{Password, PasswordCheck, PasswordHashString, PasswordHasher};

/// Strength policy plus hasher, shared by every password operation on `User`.
#[derive(Clone)]
pub struct PasswordService {
    hasher: PasswordHasher,
    policy: Arc<dyn PasswordPolicy>,
    decoy: Arc<OnceLock<PasswordHashString>>,
}

impl PasswordService {
    pub fn new(hasher: PasswordHasher, policy: Arc<dyn PasswordPolicy>) -> Self {
        Self {
            hasher,
            policy,
            decoy: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_min_length(min_length: usize) -> Self {
        Self::new(
            PasswordHasher::default(),
            Arc::new(DefaultPasswordPolicy::new(min_length)),
        )
    }

    /// Run the strength policy; all violations are reported in one message.
    pub fn validate(&self, password: &Password, user: &User) -> Result<(), AuthError> {
        self.policy
            .validate(password.as_str(), user)
            .map_err(|errors| {
                let message = errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                AuthError::InvalidParam(message)
            })
    }

    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, AuthError> {
        Ok(self.hasher.hash(password)?)
    }

    pub fn verify(
        &self,
        password: &Password,
        hash: &PasswordHashString,
    ) -> Result<PasswordCheck, AuthError> {
        Ok(self.hasher.verify(password, hash)?)
    }

    /// Run one verification against a throwaway hash built with the current
    /// costs. Called when there is no stored hash to check, so that path
    /// spends the same Argon2 work as a real mismatch.
    pub fn verify_decoy(&self, password: &Password) {
        let decoy = match self.decoy.get() {
            Some(decoy) => decoy,
            None => match self.hasher.hash(&Password::new(Uuid::new_v4().to_string())) {
                Ok(hash) => self.decoy.get_or_init(|| hash),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to build decoy password hash");
                    return;
                }
            },
        };

        if let Err(e) = self.hasher.verify(password, decoy) {
            tracing::warn!(error = %e, "Decoy password verification failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn has_decoy(&self) -> bool {
        self.decoy.get().is_some()
    }
}

impl std::fmt::Debug for PasswordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordService")
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserType;

    #[test]
    fn test_validate_joins_violations() {
        let service = PasswordService::new(
            PasswordHasher::with_costs(8, 1, 1).expect("hasher"),
            Arc::new(DefaultPasswordPolicy::new(8)),
        );
        let user = User::new(UserType::Operator);

        match service.validate(&Password::new("1234"), &user) {
            Err(AuthError::InvalidParam(message)) => {
                assert!(message.contains("at least 8 characters"));
                assert!(message.contains("entirely numeric"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decoy_hash_is_built_once_and_shared() {
        let service = PasswordService::new(
            PasswordHasher::with_costs(8, 1, 1).expect("hasher"),
            Arc::new(DefaultPasswordPolicy::new(8)),
        );
        let clone = service.clone();
        assert!(!service.has_decoy());

        service.verify_decoy(&Password::new("violet-harbor-42"));
        assert!(service.has_decoy());
        assert!(clone.has_decoy());

        let first = service.decoy.get().cloned();
        clone.verify_decoy(&Password::new("amber-canyon-77"));
        assert_eq!(service.decoy.get().cloned(), first);
    }
}
