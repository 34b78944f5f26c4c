//! Streaming TTS connection settings.

use std::time::Duration;

use crate::config::VolcConfig;
use crate::error::{Result, VolcError};

pub const DEFAULT_TTS_ENDPOINT: &str =
    "wss://openspeech.bytedance.com/api/v3/tts/unidirectional/stream";
pub const DEFAULT_RESOURCE_ID: &str = "volc.service_type.10029";
pub const DEFAULT_UID: &str = "volc-ai";
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Header used to carry the application identifier.
///
/// Two protocol revisions disagree on the name; `AppId` is the one the
/// unidirectional stream endpoint documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppHeader {
    #[default]
    AppId,
    AppKey,
}

impl AppHeader {
    pub fn header_name(self) -> &'static str {
        match self {
            Self::AppId => "X-Api-App-Id",
            Self::AppKey => "X-Api-App-Key",
        }
    }
}

/// Resolved settings for opening TTS sessions.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub app_id: String,
    pub access_key: String,
    pub resource_id: String,
    pub uid: String,
    pub app_header: AppHeader,
    /// Absolute budget from session start to `SessionFinished`.
    pub session_timeout: Duration,
}

impl SpeechConfig {
    pub fn new(app_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            app_id: app_id.into(),
            access_key: access_key.into(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            uid: DEFAULT_UID.to_string(),
            app_header: AppHeader::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Build from the layered crate configuration.
    pub fn from_config(config: &VolcConfig) -> Result<Self> {
        let app_id = config
            .app_id()
            .ok_or_else(|| VolcError::Authentication("Missing VOLC_APP_ID".into()))?;
        let access_key = config
            .access_key()
            .ok_or_else(|| VolcError::Authentication("Missing VOLC_ACCESS_KEY".into()))?;

        let mut speech = Self::new(app_id, access_key);
        if let Some(endpoint) = config.tts_endpoint() {
            speech.endpoint = endpoint;
        }
        if let Some(resource_id) = config.resource_id() {
            speech.resource_id = resource_id;
        }
        if let Some(timeout) = config.session_timeout() {
            speech.session_timeout = timeout;
        }
        Ok(speech)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_app_header(mut self, app_header: AppHeader) -> Self {
        self.app_header = app_header;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(VolcError::Authentication(
                "Missing app id for speech synthesis".into(),
            ));
        }
        if self.access_key.trim().is_empty() {
            return Err(VolcError::Authentication(
                "Missing access key for speech synthesis".into(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(VolcError::Configuration(
                "Speech endpoint cannot be empty".into(),
            ));
        }
        if self.session_timeout.is_zero() {
            return Err(VolcError::Configuration(
                "Session timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
