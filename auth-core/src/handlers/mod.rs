pub mod auth;
pub mod user;

pub use auth::{authenticate, REFRESH_TOKEN_COOKIE};
pub use user::get_user;
