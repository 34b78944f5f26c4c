//! Shared HTTP client, auth headers, and Ark error mapping.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;

use crate::error::{ErrorCode, ErrorDetails, VolcError};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

const CLIENT_USER_AGENT: &str = concat!("volc-ai/", env!("CARGO_PKG_VERSION"));

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> Result<HeaderMap, VolcError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| VolcError::Configuration("API key contains invalid characters".into()))?;
    headers.insert(AUTHORIZATION, auth);
    Ok(headers)
}

pub fn trim_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

#[derive(Debug, Deserialize)]
struct ArkErrorEnvelope {
    error: ArkErrorBody,
}

#[derive(Debug, Deserialize)]
struct ArkErrorBody {
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    param: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Map an `{"error": {"code", "message"}}` body to an API error.
///
/// Returns `None` when the body carries no error code; Ark sometimes reports
/// failures with status 200.
pub fn ark_error(status: u16, body: &str) -> Option<VolcError> {
    let envelope: ArkErrorEnvelope = serde_json::from_str(body).ok()?;
    let code = envelope.error.code.filter(|code| !code.is_empty())?;
    let message = envelope
        .error
        .message
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string());

    if let Some(kind) = &envelope.error.kind {
        tracing::debug!(code = %code, kind = %kind, "ark error body");
    }

    let details = ErrorDetails {
        code: Some(ErrorCode::from_provider_code(&code)),
        provider_code: Some(code.clone()),
        param: envelope.error.param,
        request_id: None,
    };
    Some(VolcError::api_with_details(
        status,
        format!("VolcEngine AI API error: {code} - {message}"),
        details,
    ))
}

/// Extract an error from a non-success HTTP status.
pub fn status_to_error(status: u16, body: &str) -> VolcError {
    match status {
        401 | 403 => VolcError::Authentication(
            ark_error(status, body)
                .map(|error| error.to_string())
                .unwrap_or_else(|| body.to_string()),
        ),
        429 => VolcError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => ark_error(status, body).unwrap_or_else(|| VolcError::api(status, body)),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn bearer_headers_carry_token() {
        let headers = bearer_headers("ark-123").unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer ark-123");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn bearer_headers_reject_control_characters() {
        assert!(matches!(
            bearer_headers("bad\nkey"),
            Err(VolcError::Configuration(_))
        ));
    }

    #[test]
    fn ark_error_body_is_detected() {
        let body = r#"{"error":{"code":"InvalidParameter.Prompt","message":"prompt too long","param":"prompt"}}"#;
        let err = ark_error(200, body).unwrap();

        assert!(err.to_string().contains("InvalidParameter.Prompt - prompt too long"));
        assert_eq!(err.category(), ErrorCategory::Api);
        match err {
            VolcError::Api { details: Some(details), .. } => {
                assert_eq!(details.param.as_deref(), Some("prompt"));
                assert_eq!(details.provider_code.as_deref(), Some("InvalidParameter.Prompt"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bodies_without_error_code_are_not_errors() {
        assert!(ark_error(200, r#"{"choices":[]}"#).is_none());
        assert!(ark_error(200, r#"{"error":{"message":"no code"}}"#).is_none());
        assert!(ark_error(200, "not json").is_none());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_to_error(401, "{}"),
            VolcError::Authentication(_)
        ));
        assert!(matches!(
            status_to_error(429, r#"{"error":{"retry_after":1.5}}"#),
            VolcError::RateLimited {
                retry_after_ms: Some(1500)
            }
        ));
        assert!(matches!(
            status_to_error(500, "boom"),
            VolcError::Api { status: 500, .. }
        ));
    }
}
