use service_core::error::AppError;
use thiserror::Error;

/// Failures raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Storage session is closed")]
    SessionClosed,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Improperly configured: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("User password or email is not valid")]
    InvalidCredentials,

    #[error("Credentials expired")]
    CredentialsExpired,

    #[error("Credentials invalid")]
    CredentialsInvalid,

    #[error("{operation} operation with engine '{engine}' not supported")]
    NotAllowed {
        operation: &'static str,
        engine: &'static str,
    },

    #[error("{operation} operation with engine '{engine}' not realized yet")]
    NotImplemented {
        operation: &'static str,
        engine: &'static str,
    },

    #[error("Can not do anything until the user is confirmed")]
    AccountNotConfirmed,

    #[error("Can not do anything while the user is blocked")]
    AccountBlocked,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn not_allowed(operation: &'static str, engine: &'static str) -> Self {
        AuthError::NotAllowed { operation, engine }
    }

    pub fn not_implemented(operation: &'static str, engine: &'static str) -> Self {
        AuthError::NotImplemented { operation, engine }
    }

    /// Stable identifier of the failure kind, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "configuration_error",
            AuthError::InvalidParam(_) => "invalid_param",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::CredentialsExpired => "credentials_expired",
            AuthError::CredentialsInvalid => "credentials_invalid",
            AuthError::NotAllowed { .. } => "not_allowed",
            AuthError::NotImplemented { .. } => "not_implemented",
            AuthError::AccountNotConfirmed => "account_not_confirmed",
            AuthError::AccountBlocked => "account_blocked",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::NotFound(_) => "not_found",
            AuthError::Storage(_) => "storage_error",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

impl AuthError {
    /// Emit the failure event; every kind carries its `code`.
    fn log(&self) {
        let code = self.code();
        match self {
            AuthError::Configuration(_) => {
                tracing::error!(code, error = %self, "Auth core misconfigured")
            }
            AuthError::Storage(_) | AuthError::Internal(_) => {
                tracing::error!(code, error = %self, "Auth request failed")
            }
            AuthError::NotAllowed { .. } => {
                tracing::info!(code, error = %self, "Unsupported engine operation requested")
            }
            AuthError::NotImplemented { .. } => {
                tracing::info!(code, error = %self, "Unrealized engine operation requested")
            }
            _ => tracing::info!(code, error = %self, "Auth request rejected"),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        err.log();
        match err {
            AuthError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            AuthError::InvalidParam(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            AuthError::InvalidCredentials
            | AuthError::CredentialsExpired
            | AuthError::CredentialsInvalid => AppError::AuthError(anyhow::anyhow!(err.to_string())),
            AuthError::NotAllowed { .. } => {
                AppError::MethodNotAllowed(anyhow::anyhow!(err.to_string()))
            }
            AuthError::NotImplemented { .. } => {
                AppError::NotImplemented(anyhow::anyhow!(err.to_string()))
            }
            AuthError::AccountNotConfirmed | AuthError::AccountBlocked => {
                AppError::Forbidden(anyhow::anyhow!(err.to_string()))
            }
            AuthError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            AuthError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            AuthError::Storage(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}
