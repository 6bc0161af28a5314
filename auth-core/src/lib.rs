pub mod config;
pub mod dtos;
pub mod engines;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

use axum::{
    extract::State,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AuthConfig;
use crate::engines::EngineServices;
use crate::error::AuthError;
use crate::services::{PasswordService, Storage, TokenService};

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub storage: Arc<dyn Storage>,
    pub tokens: TokenService,
    pub passwords: PasswordService,
}

impl AppState {
    pub fn engine_services(&self) -> EngineServices<'_> {
        EngineServices {
            tokens: &self.tokens,
            passwords: &self.passwords,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/auth", post(handlers::authenticate))
        .route("/users/:user_id", get(handlers::get_user))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.storage.health_check().await.map_err(AuthError::from)?;
    Ok(Json(json!({
        "status": "healthy",
        "service": state.config.service_name,
    })))
}
