use jsonwebtoken::Algorithm;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub access_token_timeout_minutes: i64,
    pub refresh_token_timeout_minutes: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field(
                "access_token_timeout_minutes",
                &self.access_token_timeout_minutes,
            )
            .field(
                "refresh_token_timeout_minutes",
                &self.refresh_token_timeout_minutes,
            )
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
}

pub const DEFAULT_ACCESS_TOKEN_TIMEOUT_MINUTES: i64 = 60 * 24 * 3;
pub const DEFAULT_REFRESH_TOKEN_TIMEOUT_MINUTES: i64 = 60 * 24 * 30;

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("auth-core"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                secret_key: get_env("JWT_SECRET_KEY", None, is_prod)?,
                algorithm: parse_algorithm(&get_env("JWT_ALGORITHM", Some("HS256"), is_prod)?)?,
                access_token_timeout_minutes: parse_env(
                    "ACCESS_TOKEN_TIMEOUT_MINUTES",
                    "4320",
                    is_prod,
                )?,
                refresh_token_timeout_minutes: parse_env(
                    "REFRESH_TOKEN_TIMEOUT_MINUTES",
                    "43200",
                    is_prod,
                )?,
            },
            password: PasswordConfig {
                min_length: parse_env("PASSWORD_MIN_LENGTH", "8", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.secret_key.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET_KEY must not be empty"
            )));
        }

        if self.jwt.access_token_timeout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_TIMEOUT_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_timeout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_TIMEOUT_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_timeout_minutes < self.jwt.access_token_timeout_minutes {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_TIMEOUT_MINUTES must not be shorter than ACCESS_TOKEN_TIMEOUT_MINUTES"
            )));
        }

        if self.environment == Environment::Prod && self.jwt.secret_key.len() < 32 {
            tracing::warn!("JWT_SECRET_KEY is shorter than 32 bytes in production");
        }

        Ok(())
    }
}

/// Only the HMAC family is accepted: tokens are signed and verified with one shared secret.
pub fn parse_algorithm(value: &str) -> Result<Algorithm, AppError> {
    match value.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(AppError::ConfigError(anyhow::anyhow!(
            "Unsupported JWT_ALGORITHM: {}",
            other
        ))),
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
