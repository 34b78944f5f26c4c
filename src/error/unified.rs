//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidApiKey,
    RateLimitExceeded,
    ModelNotFound,
    InvalidRequest,
    ContentFiltered,
    ServerError,
    ServiceUnavailable,
    Unknown,
}

impl ErrorCode {
    /// Map an Ark `error.code` string onto a broad code.
    ///
    /// Ark codes are dotted (`RateLimitExceeded.EndpointRPMExceeded`); only the
    /// leading segment is significant here.
    pub fn from_provider_code(code: &str) -> Self {
        let head = code.split('.').next().unwrap_or_default();
        match head {
            "AuthenticationError" | "InvalidAccountStatus" | "AccessDenied" => {
                Self::InvalidApiKey
            }
            "RateLimitExceeded" | "QuotaExceeded" => Self::RateLimitExceeded,
            "ModelNotOpen" | "InvalidEndpointOrModel" => Self::ModelNotFound,
            "InvalidParameter" | "MissingParameter" => Self::InvalidRequest,
            "SensitiveContentDetected" | "InputTextSensitiveContentDetected"
            | "OutputTextSensitiveContentDetected" | "InputImageSensitiveContentDetected" => {
                Self::ContentFiltered
            }
            "InternalServiceError" => Self::ServerError,
            "ServerOverloaded" => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    Protocol,
    Cache,
    /// The caller cancelled the operation.
    Cancelled,
    Unknown,
}

/// Structured details returned by a provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: Option<ErrorCode>,
    pub provider_code: Option<String>,
    pub param: Option<String>,
    pub request_id: Option<String>,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckCacheDirectory,
    ContactSupport,
    /// Nothing to recover; the caller stopped the work.
    NoAction,
}
