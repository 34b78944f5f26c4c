//! WebSocket adapter for the TTS transport.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use super::{ConnectionHeaders, SpeechTransport, TransportConnection};
use crate::error::{Result, VolcError};

type SpeechWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens TTS sessions over `wss://` (or `ws://` for local servers).
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl SpeechTransport for WebSocketTransport {
    async fn open(
        &self,
        url: &str,
        headers: &ConnectionHeaders,
    ) -> Result<Box<dyn TransportConnection>> {
        let mut request = url.into_client_request().map_err(|error| {
            VolcError::Configuration(format!("Invalid speech websocket URL: {error}"))
        })?;
        for (name, value) in headers.iter() {
            let value = HeaderValue::from_str(value).map_err(|error| {
                VolcError::Configuration(format!("Invalid value for header {name}: {error}"))
            })?;
            request.headers_mut().insert(name, value);
        }

        let (socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                VolcError::Connect(format!(
                    "handshake did not complete within {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(map_connect_error)?;

        debug!(url, "speech websocket connected");
        Ok(Box::new(WebSocketConnection {
            socket,
            closed: false,
        }))
    }
}

struct WebSocketConnection {
    socket: SpeechWebSocket,
    closed: bool,
}

#[async_trait]
impl TransportConnection for WebSocketConnection {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        self.socket
            .send(Message::Binary(frame.into()))
            .await
            .map_err(map_stream_error)
    }

    async fn receive_next(&mut self) -> Result<Vec<u8>> {
        loop {
            let Some(message) = self.socket.next().await else {
                return Err(VolcError::ConnectionClosed("stream ended".into()));
            };
            match message.map_err(map_stream_error)? {
                Message::Binary(data) => return Ok(data.to_vec()),
                Message::Ping(payload) => {
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(map_stream_error)?;
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|frame| format!("{} {}", u16::from(frame.code), frame.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(VolcError::ConnectionClosed(reason));
                }
                Message::Text(text) => {
                    debug!(len = text.len(), "ignoring text message on speech stream");
                }
                _ => {}
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.socket.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(error) => Err(map_stream_error(error)),
        }
    }
}

fn map_connect_error(error: WsError) -> VolcError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                VolcError::Authentication(format!(
                    "Speech websocket authentication failed with status {status}"
                ))
            } else {
                VolcError::Connect(format!("handshake rejected with status {status}"))
            }
        }
        WsError::Url(error) => {
            VolcError::Configuration(format!("Invalid speech websocket URL: {error}"))
        }
        other => VolcError::Connect(other.to_string()),
    }
}

/// Once the handshake is done, any transport failure means the peer is gone.
fn map_stream_error(error: WsError) -> VolcError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            VolcError::ConnectionClosed("connection closed".into())
        }
        WsError::Io(error) => {
            VolcError::ConnectionClosed(format!("{:?}: {error}", error.kind()))
        }
        other => VolcError::ConnectionClosed(other.to_string()),
    }
}
