//! Shared fixtures for unit tests.

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use std::sync::Arc;

use crate::config::JwtConfig;
use crate::models::User;
use crate::services::{DefaultPasswordPolicy, FixedClock, PasswordService, TokenService};
use crate::utils::PasswordHasher;

pub const TEST_SECRET: &str = "test-secret";

/// Cheap Argon2 costs keep the suite fast.
pub fn password_service() -> PasswordService {
    PasswordService::new(
        PasswordHasher::with_costs(8, 1, 1).expect("Failed to build hasher"),
        Arc::new(DefaultPasswordPolicy::new(8)),
    )
}

pub fn token_service(now: DateTime<Utc>) -> (TokenService, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now));
    let config = JwtConfig {
        secret_key: TEST_SECRET.to_string(),
        algorithm: Algorithm::HS256,
        access_token_timeout_minutes: 15,
        refresh_token_timeout_minutes: 60,
    };
    let tokens = TokenService::new(&config, clock.clone()).expect("Failed to create token service");
    (tokens, clock)
}

pub fn confirmed(mut user: User) -> User {
    user.is_confirmed = true;
    user
}
