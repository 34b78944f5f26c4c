//! Bidirectional streaming transport used by TTS sessions.
//!
//! The protocol layer only sees these traits; the WebSocket implementation
//! is one adapter, test doubles are another.

#[cfg(feature = "speech")]
mod websocket;
#[cfg(test)]
pub(crate) mod test_support;

#[cfg(feature = "speech")]
pub use websocket::WebSocketTransport;

use async_trait::async_trait;

use super::config::SpeechConfig;
use crate::error::Result;

pub const ACCESS_KEY_HEADER: &str = "X-Api-Access-Key";
pub const RESOURCE_ID_HEADER: &str = "X-Api-Resource-Id";
pub const REQUEST_ID_HEADER: &str = "X-Api-Request-Id";

/// Headers sent when opening a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionHeaders {
    entries: Vec<(&'static str, String)>,
}

impl ConnectionHeaders {
    /// Authentication headers plus the per-connection correlation id.
    pub fn for_session(config: &SpeechConfig, request_id: &str) -> Self {
        Self {
            entries: vec![
                (config.app_header.header_name(), config.app_id.clone()),
                (ACCESS_KEY_HEADER, config.access_key.clone()),
                (RESOURCE_ID_HEADER, config.resource_id.clone()),
                (REQUEST_ID_HEADER, request_id.to_string()),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, value.as_str()))
    }
}

impl std::fmt::Debug for ConnectionHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.entries {
            if *key == ACCESS_KEY_HEADER {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Opens streaming connections.
#[async_trait]
pub trait SpeechTransport: Send + Sync {
    /// Open a connection; fails with [`VolcError::Connect`] (or
    /// `Authentication` when the handshake is rejected).
    ///
    /// [`VolcError::Connect`]: crate::error::VolcError::Connect
    async fn open(
        &self,
        url: &str,
        headers: &ConnectionHeaders,
    ) -> Result<Box<dyn TransportConnection>>;
}

/// One open connection. Owned by a single session.
#[async_trait]
pub trait TransportConnection: Send {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Wait for the next binary message.
    ///
    /// Returns `ConnectionClosed` when the peer closes before data arrives.
    async fn receive_next(&mut self) -> Result<Vec<u8>>;

    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_credentials_and_correlation_id() {
        let config = SpeechConfig::new("app-1", "secret").with_resource_id("res-9");
        let headers = ConnectionHeaders::for_session(&config, "req-42");

        assert_eq!(headers.get("x-api-app-id"), Some("app-1"));
        assert_eq!(headers.get(ACCESS_KEY_HEADER), Some("secret"));
        assert_eq!(headers.get(RESOURCE_ID_HEADER), Some("res-9"));
        assert_eq!(headers.get(REQUEST_ID_HEADER), Some("req-42"));
        assert_eq!(headers.iter().count(), 4);
    }

    #[test]
    fn app_key_variant_renames_header() {
        let config = SpeechConfig::new("app-1", "secret")
            .with_app_header(crate::speech::config::AppHeader::AppKey);
        let headers = ConnectionHeaders::for_session(&config, "r");

        assert_eq!(headers.get("X-Api-App-Key"), Some("app-1"));
        assert_eq!(headers.get("X-Api-App-Id"), None);
    }

    #[test]
    fn debug_output_redacts_access_key() {
        let config = SpeechConfig::new("app-1", "super-secret");
        let rendered = format!("{:?}", ConnectionHeaders::for_session(&config, "r"));

        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
