pub mod identity;

pub use identity::{RequestIdentity, AUTH_TOKEN_HEADER};
