use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Server-side record of an issued refresh token.
///
/// The token string itself is the key; one user may hold any number of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub value: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn new(value: impl Into<String>, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}
