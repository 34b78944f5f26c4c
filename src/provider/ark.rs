//! Authenticated JSON client for the Ark API.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::http::{ark_error, bearer_headers, shared_client, status_to_error, trim_trailing_slash};
use crate::config::VolcConfig;
use crate::error::{Result, VolcError};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

pub const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Bearer-authenticated client shared by the chat and image glue.
#[derive(Debug, Clone)]
pub struct ArkClient {
    api_key: String,
    base_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl ArkClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &VolcConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| VolcError::Authentication("Missing VOLC_API_KEY".into()))?;
        let mut client = Self::new(api_key);
        if let Some(base_url) = config.base_url() {
            client.base_url = base_url;
        }
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            trim_trailing_slash(&self.base_url),
            path.trim_start_matches('/')
        )
    }

    /// POST `body` to `path` and return the parsed JSON response.
    pub async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Value> {
        if self.api_key.trim().is_empty() {
            return Err(VolcError::Authentication("Missing Ark API key".into()));
        }
        let url = self.endpoint(path);
        self.retry_policy
            .execute(|| self.post_json_once(&url, body))
            .await
    }

    async fn post_json_once<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<Value> {
        let headers = bearer_headers(&self.api_key)?;
        with_timeout(self.timeout, async {
            let response = shared_client()
                .post(url)
                .headers(headers)
                .json(body)
                .send()
                .await?;

            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            if !(200..300).contains(&status) {
                return Err(status_to_error(status, &text));
            }
            if let Some(error) = ark_error(status, &text) {
                return Err(error);
            }
            debug!(url, status, bytes = text.len(), "ark response");
            Ok(serde_json::from_str(&text)?)
        })
        .await
    }

    /// Download a URL returned by the API (no auth header).
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.retry_policy
            .execute(|| async {
                with_timeout(self.timeout, async {
                    let response = shared_client().get(url).send().await?;
                    let status = response.status().as_u16();
                    if !(200..300).contains(&status) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(status_to_error(status, &body));
                    }
                    Ok(response.bytes().await?.to_vec())
                })
                .await
            })
            .await
    }
}
