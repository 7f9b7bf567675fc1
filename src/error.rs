//! Error types for the console.
//!
//! Two layers on purpose: `ApiError`/`ConfigError` are *thrown* (transport
//! and startup failures), while `Rejection` is *data*: the structured
//! `success:false` outcome every remote operation can return. Rejections
//! travel inside `Outcome<T>` and never cross a component boundary as an
//! `Err`.

use serde::{Deserialize, Serialize};

/// Top-level error type for the console.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport and protocol failures from the remote boundary.
///
/// Anything here means the call itself broke; a remote operation that ran
/// and said "no" comes back as `Outcome::Rejected` instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Console credential rejected (HTTP 401), log in again")]
    Unauthorized,

    #[error("Unexpected response from {endpoint}: HTTP {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Invalid base URL: {0}")]
    BadBaseUrl(String),
}

/// Machine-readable classification of a failed remote outcome.
///
/// Produced once at the remote boundary (from a structured field when the
/// backend sends one, from the message text otherwise) so that callers match
/// on the enum and never on presentation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHint {
    InvalidPhone,
    RateLimited,
    InvalidOrExpiredCode,
    WrongPassword,
    SessionUnauthenticated,
    Transport,
}

/// A structured `success:false` result from a remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub message: String,
    pub hint: Option<ErrorHint>,
}

impl Rejection {
    pub fn new(message: impl Into<String>, hint: Option<ErrorHint>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }

    /// True when the rejection means "the account session dropped" rather
    /// than "this particular operation failed".
    pub fn is_unauthenticated(&self) -> bool {
        self.hint == Some(ErrorHint::SessionUnauthenticated)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Mask bearer tokens, passwords, and api keys before a message is logged.
pub fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|api[_\-]?key|secret|password)\b(\s*[:=]\s*)([^,\s]+)",
            "$1$2[REDACTED]",
        ),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}

/// Result type alias for the console.
pub type Result<T> = std::result::Result<T, Error>;
