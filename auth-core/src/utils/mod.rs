pub mod password;
pub mod validation;

pub use password::{Password, PasswordCheck, PasswordHashString, PasswordHasher};
pub use validation::ValidatedJson;
