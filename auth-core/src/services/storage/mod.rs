//! Transactional storage boundary.
//!
//! A `Storage` hands out one `StorageSession` per request. Every write made
//! through a session becomes visible only after `commit`; dropping or rolling
//! back a session discards them.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::{RefreshToken, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a new session.
    async fn begin(&self) -> Result<Box<dyn StorageSession>, StorageError>;

    async fn health_check(&self) -> Result<(), StorageError>;
}

#[async_trait]
pub trait StorageSession: Send {
    /// False once the session was committed or rolled back.
    fn is_active(&self) -> bool;

    /// Case-insensitive lookup by email.
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StorageError>;

    async fn find_user_by_id(&mut self, user_id: Uuid) -> Result<Option<User>, StorageError>;

    /// Fails with `Conflict` if a record with the same value already exists.
    async fn insert_refresh_token(&mut self, token: &RefreshToken) -> Result<(), StorageError>;

    async fn update_password_hash(
        &mut self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;

    async fn rollback(&mut self) -> Result<(), StorageError>;
}
