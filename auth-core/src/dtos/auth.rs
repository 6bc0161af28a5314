use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engines::Credentials;
use crate::models::UserResponse;

/// Body of `POST /auth/auth`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AuthRequest {
    #[validate(length(min = 1, message = "Auth engine must not be empty"))]
    pub engine: String,
    #[serde(default)]
    pub credentials: Credentials,
}

/// The refresh token travels in a cookie, never in this body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserResponse,
}
