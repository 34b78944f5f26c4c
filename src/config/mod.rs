//! Configuration system (layered: code > env > config file).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, VolcError};

/// Global default config (lazy-initialized from file + env).
static DEFAULT_CONFIG: OnceLock<VolcConfig> = OnceLock::new();

const CONFIG_DIR_NAME: &str = ".volc-ai";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Individually addressable settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Bearer key for the Ark chat/image API.
    ApiKey,
    AppId,
    AccessKey,
    ResourceId,
    BaseUrl,
    TtsEndpoint,
    CacheDir,
    SessionTimeoutMs,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 8] = [
        Self::ApiKey,
        Self::AppId,
        Self::AccessKey,
        Self::ResourceId,
        Self::BaseUrl,
        Self::TtsEndpoint,
        Self::CacheDir,
        Self::SessionTimeoutMs,
    ];

    pub fn env_var(self) -> &'static str {
        match self {
            Self::ApiKey => "VOLC_API_KEY",
            Self::AppId => "VOLC_APP_ID",
            Self::AccessKey => "VOLC_ACCESS_KEY",
            Self::ResourceId => "VOLC_RESOURCE_ID",
            Self::BaseUrl => "VOLC_BASE_URL",
            Self::TtsEndpoint => "VOLC_TTS_ENDPOINT",
            Self::CacheDir => "VOLC_CACHE_DIR",
            Self::SessionTimeoutMs => "VOLC_SESSION_TIMEOUT_MS",
        }
    }

    fn is_secret(self) -> bool {
        matches!(self, Self::ApiKey | Self::AccessKey)
    }
}

/// On-disk layout of `~/.volc-ai/config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    app_id: Option<String>,
    access_key: Option<String>,
    resource_id: Option<String>,
    base_url: Option<String>,
    tts_endpoint: Option<String>,
    cache_dir: Option<String>,
    session_timeout_ms: Option<u64>,
}

impl FileConfig {
    fn into_pairs(self) -> Vec<(ConfigKey, String)> {
        [
            (ConfigKey::ApiKey, self.api_key),
            (ConfigKey::AppId, self.app_id),
            (ConfigKey::AccessKey, self.access_key),
            (ConfigKey::ResourceId, self.resource_id),
            (ConfigKey::BaseUrl, self.base_url),
            (ConfigKey::TtsEndpoint, self.tts_endpoint),
            (ConfigKey::CacheDir, self.cache_dir),
            (
                ConfigKey::SessionTimeoutMs,
                self.session_timeout_ms.map(|ms| ms.to_string()),
            ),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
    }
}

/// Layered configuration for the Volcengine clients.
///
/// Later layers overwrite earlier ones: the config file is read first, then
/// environment variables, and explicit `set_*` calls win over both.
#[derive(Clone, Default)]
pub struct VolcConfig {
    values: Arc<RwLock<HashMap<ConfigKey, String>>>,
}

impl fmt::Debug for VolcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for key in ConfigKey::ALL {
            if let Some(value) = values.get(&key) {
                if key.is_secret() {
                    map.entry(&key, &"<redacted>");
                } else {
                    map.entry(&key, value);
                }
            }
        }
        map.finish()
    }
}

impl VolcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (`.env` honoured).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let config = Self::new();
        config.apply_env();
        config
    }

    /// Parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&contents).map_err(|error| {
            VolcError::Configuration(format!("Invalid config file {}: {error}", path.display()))
        })?;

        let config = Self::new();
        for (key, value) in file.into_pairs() {
            config.set(key, value);
        }
        Ok(config)
    }

    /// Default config file location, `~/.volc-ai/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Config file (if present) overlaid with the environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        let config = match Self::default_path().filter(|path| path.is_file()) {
            Some(path) => Self::from_file(&path).unwrap_or_else(|error| {
                warn!(path = %path.display(), error = %error, "ignoring unreadable config file");
                Self::new()
            }),
            None => Self::new(),
        };
        config.apply_env();
        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static VolcConfig {
        DEFAULT_CONFIG.get_or_init(Self::load)
    }

    fn apply_env(&self) {
        for key in ConfigKey::ALL {
            if let Ok(value) = std::env::var(key.env_var()) {
                if !value.trim().is_empty() {
                    self.set(key, value);
                }
            }
        }
    }

    pub fn set(&self, key: ConfigKey, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into());
    }

    pub fn get(&self, key: ConfigKey) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn set_api_key(&self, key: impl Into<String>) {
        self.set(ConfigKey::ApiKey, key);
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        self.set(ConfigKey::BaseUrl, url);
    }

    pub fn set_speech_credentials(&self, app_id: impl Into<String>, access_key: impl Into<String>) {
        self.set(ConfigKey::AppId, app_id);
        self.set(ConfigKey::AccessKey, access_key);
    }

    pub fn api_key(&self) -> Option<String> {
        self.get(ConfigKey::ApiKey)
    }

    pub fn app_id(&self) -> Option<String> {
        self.get(ConfigKey::AppId)
    }

    pub fn access_key(&self) -> Option<String> {
        self.get(ConfigKey::AccessKey)
    }

    pub fn resource_id(&self) -> Option<String> {
        self.get(ConfigKey::ResourceId)
    }

    pub fn base_url(&self) -> Option<String> {
        self.get(ConfigKey::BaseUrl)
    }

    pub fn tts_endpoint(&self) -> Option<String> {
        self.get(ConfigKey::TtsEndpoint)
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.get(ConfigKey::CacheDir).map(PathBuf::from)
    }

    /// Session timeout; unparsable values are ignored.
    pub fn session_timeout(&self) -> Option<Duration> {
        let raw = self.get(ConfigKey::SessionTimeoutMs)?;
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
            _ => {
                warn!(value = %raw, "ignoring invalid session timeout");
                None
            }
        }
    }

    /// Whether chat/image credentials are configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_values_round_trip() {
        let config = VolcConfig::new();
        config.set_api_key("ark-key");
        config.set_speech_credentials("app", "secret");

        assert_eq!(config.api_key().as_deref(), Some("ark-key"));
        assert_eq!(config.app_id().as_deref(), Some("app"));
        assert_eq!(config.access_key().as_deref(), Some("secret"));
        assert!(config.has_api_key());
        assert_eq!(config.base_url(), None);
    }

    #[test]
    fn file_values_are_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "app_id = \"file-app\"\ncache_dir = \"/tmp/volc\"\nsession_timeout_ms = 1500"
        )
        .unwrap();

        let config = VolcConfig::from_file(file.path()).unwrap();

        assert_eq!(config.app_id().as_deref(), Some("file-app"));
        assert_eq!(config.cache_dir(), Some(PathBuf::from("/tmp/volc")));
        assert_eq!(config.session_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app_key = \"typo\"").unwrap();

        let err = VolcConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, VolcError::Configuration(_)));
    }

    #[test]
    fn invalid_timeout_is_ignored() {
        let config = VolcConfig::new();
        config.set(ConfigKey::SessionTimeoutMs, "soon");
        assert_eq!(config.session_timeout(), None);
        config.set(ConfigKey::SessionTimeoutMs, "0");
        assert_eq!(config.session_timeout(), None);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = VolcConfig::new();
        config.set_api_key("ark-secret");
        config.set_speech_credentials("visible-app", "access-secret");

        let rendered = format!("{config:?}");
        assert!(rendered.contains("visible-app"));
        assert!(!rendered.contains("ark-secret"));
        assert!(!rendered.contains("access-secret"));
    }
}
