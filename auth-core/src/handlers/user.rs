use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::error::AuthError;
use crate::middleware::RequestIdentity;
use crate::models::UserResponse;
use crate::services::StorageSession;
use crate::AppState;

/// `GET /users/{user_id}`: read one user, or the caller with `me`.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    mut identity: RequestIdentity,
) -> Result<Json<UserResponse>, AppError> {
    let mut session = state.storage.begin().await.map_err(AuthError::from)?;
    let result = read_user(&user_id, &mut identity, session.as_mut()).await;

    // read-only
    if let Err(e) = session.rollback().await {
        tracing::warn!(error = %e, "Failed to close read session");
    }

    Ok(Json(result?))
}

async fn read_user(
    target: &str,
    identity: &mut RequestIdentity,
    session: &mut dyn StorageSession,
) -> Result<UserResponse, AuthError> {
    let actor = identity.user(session).await?.clone();

    let target = if target == "me" {
        actor.clone()
    } else {
        let user_id = Uuid::parse_str(target)
            .map_err(|_| AuthError::InvalidParam(format!("Invalid user_id value: {}", target)))?;
        session.find_user_by_id(user_id).await?.ok_or_else(|| {
            AuthError::NotFound(format!("User with user_id: {} does not exists", user_id))
        })?
    };

    if !actor.can_read_user(&target)? {
        tracing::info!(actor = %actor.user_id, target = %target.user_id, "User read denied");
        return Err(AuthError::Forbidden(
            "You have not enough permissions to read this user".to_string(),
        ));
    }

    Ok(target.sanitized())
}
