//! Error types for volc-ai.

pub mod unified;

pub use unified::{ErrorCategory, ErrorCode, ErrorDetails, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all volc-ai operations.
#[derive(Error, Debug)]
pub enum VolcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<ErrorDetails>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The streaming transport could not be established.
    #[error("Connect error: {0}")]
    Connect(String),

    /// The transport closed before the session reached a terminal state.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The caller cancelled the work through its cancellation token.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Frame too short: {len} bytes, need at least {min}")]
    FrameTooShort { len: usize, min: usize },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The remote service reported a failure through its own payload.
    #[error("Downstream service error{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    DownstreamService { code: Option<u32>, message: String },

    #[error("Cache IO error at {path}: {source}")]
    CacheIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VolcError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: None,
        }
    }

    /// Create an API error with full details.
    pub fn api_with_details(
        status: u16,
        message: impl Into<String>,
        details: ErrorDetails,
    ) -> Self {
        Self::Api {
            status,
            message: message.into(),
            source: None,
            details: Some(details),
        }
    }

    pub fn cache_io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::CacheIo {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Connect(_) | Self::ConnectionClosed(_) => {
                ErrorCategory::Network
            }
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::FrameTooShort { .. } | Self::MalformedFrame(_) => ErrorCategory::Protocol,
            Self::DownstreamService { .. } => ErrorCategory::Server,
            Self::CacheIo { .. } => ErrorCategory::Cache,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Api {
                status, details, ..
            } => {
                if let Some(code) = details.as_ref().and_then(|d| d.code) {
                    match code {
                        ErrorCode::InvalidApiKey => return ErrorCategory::Authentication,
                        ErrorCode::RateLimitExceeded => return ErrorCategory::RateLimit,
                        ErrorCode::ServerError | ErrorCode::ServiceUnavailable => {
                            return ErrorCategory::Server
                        }
                        _ => {}
                    }
                }
                match status {
                    401 | 403 => ErrorCategory::Authentication,
                    429 => ErrorCategory::RateLimit,
                    500..=599 => ErrorCategory::Server,
                    _ => ErrorCategory::Api,
                }
            }
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Network => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Cache => RecoverySuggestion::CheckCacheDirectory,
            ErrorCategory::Cancelled => RecoverySuggestion::NoAction,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VolcError>;
