//! Environment-driven configuration.
//!
//! Loaded once in `main` and handed to constructors explicitly. The webhook
//! secret is wrapped so it never shows up in `Debug` output or logs.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use envconfig::Envconfig;

use crate::error::ConfigError;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Envconfig, Clone, Debug)]
pub struct AppConfig {
    /// Provider signing secret, in its `whsec_<base64>` form.
    #[envconfig(from = "CLERK_WEBHOOK_SECRET")]
    pub webhook_secret: WebhookSecret,

    #[envconfig(from = "SERVER_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "SERVER_PORT", default = "8080")]
    pub port: u16,

    /// sqlx SQLite URL, or `memory` for the in-process store.
    #[envconfig(from = "DATABASE_URL", default = "sqlite::memory:")]
    pub database_url: String,

    #[envconfig(from = "DATABASE_MAX_CONNECTIONS", default = "5")]
    pub database_max_connections: u32,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "LOG_JSON", default = "false")]
    pub log_json: bool,

    #[envconfig(from = "MAX_BODY_BYTES", default = "1048576")]
    pub max_body_bytes: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::init_from_env()?)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            json: self.log_json,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Provider-issued signing secret.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// HMAC key bytes: the secret with `whsec_` stripped, Base64-decoded.
    /// A secret without the prefix is decoded as-is.
    pub fn signing_key(&self) -> Result<Vec<u8>, ConfigError> {
        let encoded = self.0.strip_prefix(SECRET_PREFIX).unwrap_or(&self.0);
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(ConfigError::InvalidSecret)
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

impl FromStr for WebhookSecret {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
