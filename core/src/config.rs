//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const API_URL_VAR: &str = "NOVELPEDIA_API_URL";
pub const TOKEN_FILE_VAR: &str = "NOVELPEDIA_TOKEN_FILE";
pub const TIMEOUT_VAR: &str = "NOVELPEDIA_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing {0} environment variable; define it to use the API client")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Where the token pair is persisted; in-memory only when `None`.
    pub token_file: Option<PathBuf>,
    pub user_agent: String,
    /// `None` leaves timeouts to the caller.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token_file: None,
            user_agent: format!("novel-core/{}", env!("CARGO_PKG_VERSION")),
            timeout: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(API_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar(API_URL_VAR))?;
        let mut config = Self::new(base_url.trim());

        config.token_file = lookup(TOKEN_FILE_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: TIMEOUT_VAR,
                value: raw.clone(),
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }
}
