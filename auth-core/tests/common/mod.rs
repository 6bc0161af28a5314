//! Test helper module for auth-core integration tests.
//!
//! Builds the full router over in-memory storage and a frozen clock.

#![allow(dead_code)]

use auth_core::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, JwtConfig, PasswordConfig,
        DEFAULT_ACCESS_TOKEN_TIMEOUT_MINUTES, DEFAULT_REFRESH_TOKEN_TIMEOUT_MINUTES,
    },
    models::{User, UserType},
    services::{DefaultPasswordPolicy, FixedClock, MemoryStorage, PasswordService, TokenService},
    utils::{Password, PasswordHasher},
    AppState,
};
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_PASSWORD: &str = "violet-harbor-42";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: MemoryStorage,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let storage = MemoryStorage::new();
        let clock = Arc::new(FixedClock::new(Utc::now()));

        let config = AuthConfig {
            common: service_core::config::Config::default(),
            environment: Environment::Dev,
            service_name: "auth-core-test".to_string(),
            log_level: "error".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/auth_test".to_string(),
                max_connections: 1,
                min_connections: 1,
            },
            jwt: JwtConfig {
                secret_key: "integration-test-secret".to_string(),
                algorithm: Algorithm::HS256,
                access_token_timeout_minutes: DEFAULT_ACCESS_TOKEN_TIMEOUT_MINUTES,
                refresh_token_timeout_minutes: DEFAULT_REFRESH_TOKEN_TIMEOUT_MINUTES,
            },
            password: PasswordConfig { min_length: 8 },
        };

        let tokens = TokenService::new(&config.jwt, clock.clone())
            .expect("Failed to create token service");
        let passwords = PasswordService::new(
            PasswordHasher::with_costs(8, 1, 1).expect("Failed to build hasher"),
            Arc::new(DefaultPasswordPolicy::new(config.password.min_length)),
        );

        let state = AppState {
            config,
            storage: Arc::new(storage.clone()),
            tokens,
            passwords,
        };

        Self {
            router: build_router(state.clone()),
            state,
            storage,
            clock,
        }
    }

    /// Store a user with `TEST_PASSWORD`.
    pub fn create_user(&self, user_type: UserType, email: &str, confirmed: bool) -> User {
        let mut user = User::new(user_type);
        user.is_confirmed = confirmed;
        user.set_email(Some(email)).expect("Invalid test email");
        user.set_password(&Password::new(TEST_PASSWORD), &self.state.passwords)
            .expect("Test password rejected by policy");
        self.storage.insert_user(user.clone());
        user
    }

    pub fn access_token_for(&self, user: &User) -> String {
        self.state
            .tokens
            .issue(user.user_id)
            .expect("Failed to issue token")
            .access_token
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
