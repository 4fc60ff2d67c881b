//! Parlante error types

use std::fmt;
use std::time::Duration;

/// Normalized classification of a vendor-side failure.
///
/// Every adapter maps its vendor's error shapes onto one of these so the
/// orchestrators can apply a uniform fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Quota exhausted or HTTP 429. Trips the reply circuit breaker.
    RateLimited,
    /// Credentials missing or rejected. Indicates a registration bug when
    /// seen from an adapter that reported itself configured.
    Misconfigured,
    /// Network failure, timeout or 5xx. Eligible for retry and fallback.
    Transient,
    /// Anything else, including malformed vendor responses.
    Unknown,
}

impl ErrorKind {
    /// Stable lowercase label used in logs, metrics and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Misconfigured => "misconfigured",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Classify an HTTP status code the way most vendors use them.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorKind::RateLimited,
            401 | 403 => ErrorKind::Misconfigured,
            408 | 500..=599 => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

/// A single adapter's failure, normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}: {message}", code_suffix(.code))]
pub struct ProviderError {
    pub kind: ErrorKind,
    /// Vendor-specific code (HTTP status, `quota_exceeded`, ...), if any.
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Misconfigured, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Map an HTTP status and body excerpt to a provider error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_status(status), message).with_code(status.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProviderError::from_status(status.as_u16(), err.to_string()),
            // connect, timeout, body read: all worth trying elsewhere
            None => ProviderError::transient(err.to_string()),
        }
    }
}

/// One recorded failure inside a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub provider: String,
    pub error: ProviderError,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.error)
    }
}

fn describe_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no configured provider".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parlante error types
#[derive(Debug, thiserror::Error)]
pub enum ParlanteError {
    /// A single adapter failed. Orchestrators record these and only ever
    /// surface them inside [`ParlanteError::Exhausted`].
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Every candidate was tried and failed (or none was configured).
    #[error("all providers failed: {}", describe_attempts(.attempts))]
    Exhausted { attempts: Vec<Attempt> },

    /// The reply circuit breaker is open after a rate-limit failure.
    #[error("circuit open after rate limiting, retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// Malformed caller input, rejected before any provider is attempted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParlanteError {
    /// The normalized kind, for single-provider errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ParlanteError::Provider(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether retrying the same provider could help.
    pub fn is_transient(&self) -> bool {
        self.kind() == Some(ErrorKind::Transient)
    }

    /// Whether this error reports vendor rate limiting, either directly or
    /// through any attempt of an exhausted chain.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ParlanteError::Provider(e) => e.kind == ErrorKind::RateLimited,
            ParlanteError::Exhausted { attempts } => attempts
                .iter()
                .any(|a| a.error.kind == ErrorKind::RateLimited),
            _ => false,
        }
    }

    /// Per-provider failures of an exhausted chain (empty otherwise).
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            ParlanteError::Exhausted { attempts } => attempts,
            _ => &[],
        }
    }
}

/// Result type alias for Parlante operations
pub type Result<T> = std::result::Result<T, ParlanteError>;
