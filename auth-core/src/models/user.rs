//! User model - one base record per account plus a role-specific extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::error::{AuthError, StorageError};
use crate::services::storage::StorageSession;
use crate::services::PasswordService;
use crate::utils::{Password, PasswordCheck, PasswordHashString};

/// Role tag stored alongside the base record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    SuperAdmin,
    Operator,
    User,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::SuperAdmin => "SUPER_ADMIN",
            UserType::Operator => "OPERATOR",
            UserType::User => "USER",
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(UserType::SuperAdmin),
            "OPERATOR" => Ok(UserType::Operator),
            "USER" => Ok(UserType::User),
            _ => Err(format!("Unknown user type: {}", s)),
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extension record of a super admin, keyed by the base user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperAdminProfile {
    pub user_id: Uuid,
}

/// Extension record of an operator, keyed by the base user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorProfile {
    pub user_id: Uuid,
}

/// Role variant with its extension record. A plain user carries none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    SuperAdmin(SuperAdminProfile),
    Operator(OperatorProfile),
    User,
}

impl Role {
    fn for_type(user_type: UserType, user_id: Uuid) -> Self {
        match user_type {
            UserType::SuperAdmin => Role::SuperAdmin(SuperAdminProfile { user_id }),
            UserType::Operator => Role::Operator(OperatorProfile { user_id }),
            UserType::User => Role::User,
        }
    }

    pub fn user_type(&self) -> UserType {
        match self {
            Role::SuperAdmin(_) => UserType::SuperAdmin,
            Role::Operator(_) => UserType::Operator,
            Role::User => UserType::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_email_confirmed: bool,
    pub is_confirmed: bool,
    pub is_blocked: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub role: Role,
}

/// Base record joined with the optional extension keys.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub user_type: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_email_confirmed: bool,
    pub is_confirmed: bool,
    pub is_blocked: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub super_admin_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let user_type: UserType = row.user_type.parse().map_err(StorageError::Integrity)?;

        let role = match (user_type, row.super_admin_id, row.operator_id) {
            (UserType::SuperAdmin, Some(id), None) if id == row.user_id => {
                Role::SuperAdmin(SuperAdminProfile { user_id: id })
            }
            (UserType::Operator, None, Some(id)) if id == row.user_id => {
                Role::Operator(OperatorProfile { user_id: id })
            }
            (UserType::User, None, None) => Role::User,
            _ => {
                return Err(StorageError::Integrity(format!(
                    "User {} extension record does not match role {}",
                    row.user_id, user_type
                )))
            }
        };

        Ok(User {
            user_id: row.user_id,
            email: row.email,
            password_hash: row.password_hash,
            is_email_confirmed: row.is_email_confirmed,
            is_confirmed: row.is_confirmed,
            is_blocked: row.is_blocked,
            first_name: row.first_name,
            last_name: row.last_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            role,
        })
    }
}

impl User {
    /// Create an unconfirmed user of the given role with a fresh id.
    pub fn new(user_type: UserType) -> Self {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            user_id,
            email: None,
            password_hash: None,
            is_email_confirmed: false,
            is_confirmed: false,
            is_blocked: false,
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
            role: Role::for_type(user_type, user_id),
        }
    }

    pub fn user_type(&self) -> UserType {
        self.role.user_type()
    }

    /// "Last First", skipping whichever part is missing.
    pub fn full_name(&self) -> String {
        [self.last_name.as_deref(), self.first_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Set or clear the email. Stored lowercased.
    pub fn set_email(&mut self, email: Option<&str>) -> Result<(), AuthError> {
        match email {
            None => self.email = None,
            Some(value) => {
                let value = value.trim().to_lowercase();
                if !value.validate_email() {
                    return Err(AuthError::InvalidParam(format!(
                        "Invalid email format for field 'email': {}",
                        value
                    )));
                }
                self.email = Some(value);
            }
        }
        Ok(())
    }

    /// Validate strength, then store a fresh hash.
    pub fn set_password(
        &mut self,
        raw: &Password,
        passwords: &PasswordService,
    ) -> Result<(), AuthError> {
        if let Err(e) = passwords.validate(raw, self) {
            tracing::info!(user_id = %self.user_id, error = %e, "User password is invalid");
            return Err(e);
        }
        self.password_hash = Some(passwords.hash(raw)?.into_string());
        Ok(())
    }

    /// Check a raw password against the stored hash.
    ///
    /// A match against an outdated hash format rewrites the hash through
    /// `session`. That write is best effort and never changes the result.
    pub async fn check_password(
        &mut self,
        raw: &Password,
        passwords: &PasswordService,
        session: &mut dyn StorageSession,
    ) -> bool {
        let Some(stored) = self.password_hash.as_deref() else {
            passwords.verify_decoy(raw);
            return false;
        };

        let check = match passwords.verify(raw, &PasswordHashString::new(stored)) {
            Ok(check) => check,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "Stored password hash is unreadable");
                return false;
            }
        };

        match check {
            PasswordCheck::Mismatch => false,
            PasswordCheck::Match { needs_rehash } => {
                if needs_rehash {
                    self.rehash_password(raw, passwords, session).await;
                }
                true
            }
        }
    }

    async fn rehash_password(
        &mut self,
        raw: &Password,
        passwords: &PasswordService,
        session: &mut dyn StorageSession,
    ) {
        let hash = match passwords.hash(raw) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "Password rehash failed");
                return;
            }
        };

        match session.update_password_hash(self.user_id, hash.as_str()).await {
            Ok(()) => {
                self.password_hash = Some(hash.into_string());
                tracing::info!(user_id = %self.user_id, "Password hash upgraded");
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "Password rehash could not be persisted");
            }
        }
    }

    /// Replace the password after checking the old one, and persist the new hash.
    pub async fn change_password(
        &mut self,
        old: &Password,
        new: &Password,
        passwords: &PasswordService,
        session: &mut dyn StorageSession,
    ) -> Result<(), AuthError> {
        if self.password_hash.is_some() && !self.check_password(old, passwords, session).await {
            return Err(AuthError::CredentialsInvalid);
        }

        self.set_password(new, passwords)?;
        if let Some(hash) = self.password_hash.as_deref() {
            session.update_password_hash(self.user_id, hash).await?;
        }
        Ok(())
    }

    fn guarded(&self, predicate: impl FnOnce(&Role) -> bool) -> Result<bool, AuthError> {
        if !self.is_confirmed {
            return Err(AuthError::AccountNotConfirmed);
        }
        if self.is_blocked {
            return Err(AuthError::AccountBlocked);
        }
        Ok(predicate(&self.role))
    }

    pub fn can_create_user(&self, user_type: UserType) -> Result<bool, AuthError> {
        self.guarded(|role| match role {
            Role::SuperAdmin(_) => user_type != UserType::SuperAdmin,
            Role::Operator(_) | Role::User => false,
        })
    }

    pub fn can_read_user(&self, target: &User) -> Result<bool, AuthError> {
        self.guarded(|role| match role {
            Role::SuperAdmin(_) => true,
            Role::Operator(_) => target.user_id == self.user_id,
            Role::User => false,
        })
    }

    pub fn can_edit_user(&self, target: &User) -> Result<bool, AuthError> {
        self.guarded(|role| match role {
            Role::SuperAdmin(_) => true,
            Role::Operator(_) => target.user_id == self.user_id,
            Role::User => false,
        })
    }

    /// Convert to sanitized response (no password hash).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

/// User as exposed over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub user_type: UserType,
    pub email: Option<String>,
    pub is_email_confirmed: bool,
    pub is_confirmed: bool,
    pub is_blocked: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.user_id,
            user_type: u.user_type(),
            email: u.email.clone(),
            is_email_confirmed: u.is_email_confirmed,
            is_confirmed: u.is_confirmed,
            is_blocked: u.is_blocked,
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            full_name: u.full_name(),
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{MemoryStorage, Storage};
    use crate::test_support::{confirmed, password_service};
    use crate::utils::PasswordHasher;

    #[test]
    fn test_super_admin_can_create_anything_but_super_admin() {
        let admin = confirmed(User::new(UserType::SuperAdmin));

        assert_eq!(admin.can_create_user(UserType::SuperAdmin).ok(), Some(false));
        assert_eq!(admin.can_create_user(UserType::Operator).ok(), Some(true));
        assert_eq!(admin.can_create_user(UserType::User).ok(), Some(true));
    }

    #[test]
    fn test_super_admin_reads_and_edits_everyone() {
        let admin = confirmed(User::new(UserType::SuperAdmin));
        let other = User::new(UserType::Operator);

        assert_eq!(admin.can_read_user(&other).ok(), Some(true));
        assert_eq!(admin.can_edit_user(&other).ok(), Some(true));
    }

    #[test]
    fn test_operator_only_reaches_self() {
        let operator = confirmed(User::new(UserType::Operator));
        let other = User::new(UserType::Operator);

        assert_eq!(operator.can_read_user(&other).ok(), Some(false));
        assert_eq!(operator.can_read_user(&operator).ok(), Some(true));
        assert_eq!(operator.can_edit_user(&other).ok(), Some(false));
        assert_eq!(operator.can_edit_user(&operator).ok(), Some(true));
        assert_eq!(operator.can_create_user(UserType::User).ok(), Some(false));
    }

    #[test]
    fn test_plain_user_is_denied() {
        let user = confirmed(User::new(UserType::User));

        assert_eq!(user.can_create_user(UserType::User).ok(), Some(false));
        assert_eq!(user.can_read_user(&user).ok(), Some(false));
        assert_eq!(user.can_edit_user(&user).ok(), Some(false));
    }

    #[test]
    fn test_unconfirmed_actor_raises_for_every_predicate() {
        for user_type in [UserType::SuperAdmin, UserType::Operator, UserType::User] {
            let actor = User::new(user_type);
            let target = User::new(UserType::User);

            assert!(matches!(
                actor.can_create_user(UserType::Operator),
                Err(AuthError::AccountNotConfirmed)
            ));
            assert!(matches!(
                actor.can_read_user(&target),
                Err(AuthError::AccountNotConfirmed)
            ));
            assert!(matches!(
                actor.can_edit_user(&actor),
                Err(AuthError::AccountNotConfirmed)
            ));
        }
    }

    #[test]
    fn test_blocked_actor_raises() {
        let mut admin = confirmed(User::new(UserType::SuperAdmin));
        admin.is_blocked = true;

        assert!(matches!(
            admin.can_read_user(&admin),
            Err(AuthError::AccountBlocked)
        ));
    }

    #[test]
    fn test_full_name_and_email() {
        let mut user = User::new(UserType::Operator);
        user.first_name = Some("Ada".to_string());
        user.last_name = Some("Lovelace".to_string());
        assert_eq!(user.full_name(), "Lovelace Ada");

        user.set_email(Some("Ada@Example.COM")).expect("valid email");
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));

        assert!(matches!(
            user.set_email(Some("not-an-email")),
            Err(AuthError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_row_with_mismatched_extension_is_rejected() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let row = UserRow {
            user_id,
            user_type: "OPERATOR".to_string(),
            email: None,
            password_hash: None,
            is_email_confirmed: false,
            is_confirmed: true,
            is_blocked: false,
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
            super_admin_id: Some(user_id),
            operator_id: None,
        };

        assert!(matches!(
            User::try_from(row.clone()),
            Err(StorageError::Integrity(_))
        ));

        let row = UserRow {
            super_admin_id: None,
            operator_id: Some(user_id),
            ..row
        };
        let user = User::try_from(row).expect("consistent row");
        assert_eq!(user.role, Role::Operator(OperatorProfile { user_id }));
    }

    #[test]
    fn test_sanitized_drops_hash() {
        let mut user = User::new(UserType::Operator);
        user.password_hash = Some("$argon2id$secret".to_string());

        let json = serde_json::to_value(user.sanitized()).expect("serialize");
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["user_type"], "OPERATOR");
    }

    #[test]
    fn test_set_password_enforces_policy() {
        let passwords = password_service();
        let mut user = User::new(UserType::Operator);

        assert!(matches!(
            user.set_password(&Password::new("123"), &passwords),
            Err(AuthError::InvalidParam(_))
        ));
        assert!(user.password_hash.is_none());

        user.set_password(&Password::new("violet-harbor-42"), &passwords)
            .expect("strong password");
        assert!(user.password_hash.is_some());
    }

    #[tokio::test]
    async fn test_check_password_rehashes_outdated_hash() {
        let storage = MemoryStorage::new();
        let mut user = confirmed(User::new(UserType::Operator));
        let raw = Password::new("violet-harbor-42");
        let legacy = PasswordHasher::with_costs(16, 1, 1)
            .expect("hasher")
            .hash(&raw)
            .expect("hash");
        user.password_hash = Some(legacy.as_str().to_string());
        storage.insert_user(user.clone());

        let passwords = password_service();
        let mut session = storage.begin().await.expect("session");
        assert!(user.check_password(&raw, &passwords, session.as_mut()).await);
        session.commit().await.expect("commit");

        let stored = storage.user(user.user_id).expect("user");
        assert_ne!(stored.password_hash.as_deref(), Some(legacy.as_str()));
        assert_eq!(stored.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn test_check_password_survives_failed_rehash_persist() {
        let storage = MemoryStorage::new();
        let mut user = confirmed(User::new(UserType::Operator));
        let raw = Password::new("violet-harbor-42");
        let legacy = PasswordHasher::with_costs(16, 1, 1)
            .expect("hasher")
            .hash(&raw)
            .expect("hash");
        user.password_hash = Some(legacy.as_str().to_string());
        storage.insert_user(user.clone());
        storage.fail_password_updates(true);

        let passwords = password_service();
        let mut session = storage.begin().await.expect("session");
        assert!(user.check_password(&raw, &passwords, session.as_mut()).await);
        assert_eq!(user.password_hash.as_deref(), Some(legacy.as_str()));
        assert!(
            !user
                .check_password(&Password::new("wrong"), &passwords, session.as_mut())
                .await
        );
    }

    #[tokio::test]
    async fn test_change_password_requires_old_password() {
        let storage = MemoryStorage::new();
        let passwords = password_service();
        let mut user = confirmed(User::new(UserType::Operator));
        user.set_password(&Password::new("violet-harbor-42"), &passwords)
            .expect("set");
        storage.insert_user(user.clone());

        let mut session = storage.begin().await.expect("session");
        let result = user
            .change_password(
                &Password::new("wrong-old-pass"),
                &Password::new("amber-canyon-77"),
                &passwords,
                session.as_mut(),
            )
            .await;
        assert!(matches!(result, Err(AuthError::CredentialsInvalid)));

        user.change_password(
            &Password::new("violet-harbor-42"),
            &Password::new("amber-canyon-77"),
            &passwords,
            session.as_mut(),
        )
        .await
        .expect("change");
        session.commit().await.expect("commit");

        let mut stored = storage.user(user.user_id).expect("user");
        let mut session = storage.begin().await.expect("session");
        assert!(
            stored
                .check_password(&Password::new("amber-canyon-77"), &passwords, session.as_mut())
                .await
        );
    }
}
