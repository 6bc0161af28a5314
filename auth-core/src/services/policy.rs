//! Password strength validation.
//!
//! The policy sits behind a trait so deployments can swap the default rule
//! set without touching the user model.

use crate::models::User;

/// A single password policy violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Password is too short.
    PasswordTooShort {
        min_length: usize,
        actual_length: usize,
    },
    /// Password consists of digits only.
    PasswordEntirelyNumeric,
    /// Password is on the common-password list.
    PasswordTooCommon,
    /// Password resembles one of the user's own attributes.
    PasswordTooSimilar { attribute: &'static str },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::PasswordTooShort {
                min_length,
                actual_length,
            } => {
                write!(
                    f,
                    "Password must be at least {} characters (got {})",
                    min_length, actual_length
                )
            }
            PolicyError::PasswordEntirelyNumeric => {
                write!(f, "Password can not be entirely numeric")
            }
            PolicyError::PasswordTooCommon => write!(f, "Password is too common"),
            PolicyError::PasswordTooSimilar { attribute } => {
                write!(f, "Password is too similar to the {}", attribute)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

pub trait PasswordPolicy: Send + Sync {
    /// Return every violation found, or `Ok(())` when the password is acceptable.
    fn validate(&self, password: &str, user: &User) -> Result<(), Vec<PolicyError>>;
}

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "12345678", "123456789", "1234567890", "password", "password1", "password123",
    "qwerty", "qwerty123", "qwertyuiop", "111111", "11111111", "abc123", "iloveyou", "admin",
    "admin123", "welcome", "welcome1", "letmein", "monkey", "dragon", "football", "baseball",
    "sunshine", "princess", "master", "superman", "trustno1", "passw0rd", "changeme",
];

/// Length, numeric-only, common-password and user-attribute checks.
#[derive(Debug, Clone)]
pub struct DefaultPasswordPolicy {
    min_length: usize,
}

impl Default for DefaultPasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl DefaultPasswordPolicy {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    fn similar_attribute(password: &str, user: &User) -> Option<&'static str> {
        let password = password.to_lowercase();
        let mut attributes: Vec<(&'static str, String)> = Vec::new();

        if let Some(email) = user.email.as_deref() {
            attributes.push(("email address", email.to_lowercase()));
            if let Some((local, _)) = email.split_once('@') {
                attributes.push(("email address", local.to_lowercase()));
            }
        }
        if let Some(first_name) = user.first_name.as_deref() {
            attributes.push(("first name", first_name.to_lowercase()));
        }
        if let Some(last_name) = user.last_name.as_deref() {
            attributes.push(("last name", last_name.to_lowercase()));
        }

        attributes
            .into_iter()
            .filter(|(_, value)| value.chars().count() >= 3)
            .find(|(_, value)| password.contains(value.as_str()) || value.contains(&password))
            .map(|(attribute, _)| attribute)
    }
}

impl PasswordPolicy for DefaultPasswordPolicy {
    fn validate(&self, password: &str, user: &User) -> Result<(), Vec<PolicyError>> {
        let mut errors = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            errors.push(PolicyError::PasswordTooShort {
                min_length: self.min_length,
                actual_length: length,
            });
        }

        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            errors.push(PolicyError::PasswordEntirelyNumeric);
        }

        if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
            errors.push(PolicyError::PasswordTooCommon);
        }

        if let Some(attribute) = Self::similar_attribute(password, user) {
            errors.push(PolicyError::PasswordTooSimilar { attribute });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
