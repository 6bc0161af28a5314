//! PostgreSQL storage backed by sqlx.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{Storage, StorageSession};
use crate::config::DatabaseConfig;
use crate::error::StorageError;
use crate::models::{RefreshToken, Role, User, UserRow};

const SELECT_USER: &str = r#"
    SELECT u.user_id, u.user_type, u.email, u.password_hash,
           u.is_email_confirmed, u.is_confirmed, u.is_blocked,
           u.first_name, u.last_name, u.created_at, u.updated_at,
           sa.user_id AS super_admin_id, op.user_id AS operator_id
    FROM app_role_abstract_user u
    LEFT JOIN app_role_super_admin sa ON sa.user_id = u.user_id
    LEFT JOIN app_role_operator op ON op.user_id = u.user_id
"#;

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool and wrap it.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        tracing::info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await?;

        tracing::info!("Successfully connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a base user record and its role extension in one transaction.
    pub async fn insert_user(&self, user: &User) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO app_role_abstract_user
                (user_id, user_type, email, password_hash, is_email_confirmed, is_confirmed,
                 is_blocked, first_name, last_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.user_id)
        .bind(user.user_type().as_str())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_email_confirmed)
        .bind(user.is_confirmed)
        .bind(user.is_blocked)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let extension = match &user.role {
            Role::SuperAdmin(profile) => {
                Some(("INSERT INTO app_role_super_admin (user_id) VALUES ($1)", profile.user_id))
            }
            Role::Operator(profile) => {
                Some(("INSERT INTO app_role_operator (user_id) VALUES ($1)", profile.user_id))
            }
            Role::User => None,
        };
        if let Some((statement, user_id)) = extension {
            sqlx::query(statement)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn map_write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(db.message().to_string())
        }
        _ => StorageError::Database(e),
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> Result<Box<dyn StorageSession>, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx: Some(tx) }))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StorageError::Database(e)
            })?;
        Ok(())
    }
}

/// One database transaction. Dropping it without commit rolls back.
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StorageError> {
        self.tx.as_mut().ok_or(StorageError::SessionClosed)
    }

    async fn fetch_user(&mut self, key: UserKey<'_>) -> Result<Option<User>, StorageError> {
        let tx = self.tx()?;
        let row = match key {
            UserKey::Email(email) => {
                let sql = format!("{} WHERE LOWER(u.email) = $1", SELECT_USER);
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(email.to_lowercase())
                    .fetch_optional(&mut **tx)
                    .await?
            }
            UserKey::Id(user_id) => {
                let sql = format!("{} WHERE u.user_id = $1", SELECT_USER);
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };
        row.map(User::try_from).transpose()
    }
}

enum UserKey<'a> {
    Email(&'a str),
    Id(Uuid),
}

#[async_trait]
impl StorageSession for PgSession {
    fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StorageError> {
        self.fetch_user(UserKey::Email(email)).await
    }

    async fn find_user_by_id(&mut self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        self.fetch_user(UserKey::Id(user_id)).await
    }

    async fn insert_refresh_token(&mut self, token: &RefreshToken) -> Result<(), StorageError> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO app_refresh_token (value, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.value)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    /// Runs inside a savepoint so a failed update leaves the surrounding
    /// transaction usable.
    async fn update_password_hash(
        &mut self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StorageError> {
        let tx = self.tx()?;
        sqlx::query("SAVEPOINT password_rehash")
            .execute(&mut **tx)
            .await?;

        let result = sqlx::query(
            "UPDATE app_role_abstract_user SET password_hash = $1, updated_at = NOW() WHERE user_id = $2",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                sqlx::query("RELEASE SAVEPOINT password_rehash")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            }
            Ok(_) => {
                sqlx::query("ROLLBACK TO SAVEPOINT password_rehash")
                    .execute(&mut **tx)
                    .await?;
                Err(StorageError::Integrity(format!("User {} not found", user_id)))
            }
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT password_rehash")
                    .execute(&mut **tx)
                    .await?;
                Err(StorageError::Database(e))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        let tx = self.tx.take().ok_or(StorageError::SessionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StorageError> {
        let tx = self.tx.take().ok_or(StorageError::SessionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
