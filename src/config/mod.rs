//! Configuration for the console.
//!
//! Settings are env-var driven. `TELECON_API_URL` and `TELECON_AUTH_TOKEN`
//! live in `~/.telecon/.env` (loaded via dotenvy early in startup, see
//! `bootstrap`); everything else has a working default.

pub(crate) mod helpers;

use secrecy::SecretString;
use url::Url;

use crate::error::ConfigError;
use helpers::{optional_env, parsed_env, require_env};

/// Main configuration for the console.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub poll: PollConfig,
    pub browser: BrowserConfig,
}

/// Remote boundary configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend, e.g. `https://console.example.com/api`.
    pub base_url: Url,
    /// Bearer credential attached to every request.
    pub auth_token: SecretString,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Polling cadences. All advisory; loops tolerate slow remote calls.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Full metrics refresh per visible session.
    pub metrics_interval_secs: u64,
    /// Lightweight "is the account session still authorized" refresh.
    pub liveness_interval_secs: u64,
    /// Log tail refresh while a log panel is open.
    pub log_interval_secs: u64,
    /// How many log lines to request per tail fetch.
    pub log_lines: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 300,
            liveness_interval_secs: 5,
            log_interval_secs: 4,
            log_lines: 500,
        }
    }
}

/// Pattern browser knobs.
#[derive(Debug, Clone, Copy)]
pub struct BrowserConfig {
    /// Items appended per "show more" at every navigation level.
    pub page_size: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self { page_size: 40 }
    }
}

impl Config {
    /// Resolve the full configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api: ApiConfig::resolve()?,
            poll: PollConfig::resolve()?,
            browser: BrowserConfig::resolve()?,
        })
    }
}

impl ApiConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let raw_url = require_env("TELECON_API_URL")?;
        let base_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidValue {
            key: "TELECON_API_URL".to_string(),
            message: format!("must be an absolute URL: {e}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                key: "TELECON_API_URL".to_string(),
                message: "must be a hierarchical http(s) URL".to_string(),
            });
        }

        let auth_token = optional_env("TELECON_AUTH_TOKEN")?
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "TELECON_AUTH_TOKEN".to_string(),
                hint: "log in to the backend and put the bearer token in ~/.telecon/.env"
                    .to_string(),
            })?;

        let timeout_ms = parsed_env("TELECON_TIMEOUT_MS", 30_000u64)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TELECON_TIMEOUT_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        Ok(Self {
            base_url,
            auth_token,
            timeout_ms,
        })
    }
}

impl PollConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            metrics_interval_secs: parsed_env(
                "TELECON_METRICS_POLL_SECS",
                defaults.metrics_interval_secs,
            )?,
            liveness_interval_secs: parsed_env(
                "TELECON_LIVENESS_POLL_SECS",
                defaults.liveness_interval_secs,
            )?,
            log_interval_secs: parsed_env("TELECON_LOG_POLL_SECS", defaults.log_interval_secs)?,
            log_lines: parsed_env("TELECON_LOG_LINES", defaults.log_lines)?,
        })
    }
}

impl BrowserConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let page_size = parsed_env("TELECON_PAGE_SIZE", Self::default().page_size)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TELECON_PAGE_SIZE".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        Ok(Self { page_size })
    }
}
