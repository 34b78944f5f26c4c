//! One request/response exchange with the TTS service.
//!
//! A session opens a connection, sends a single text request, then reads
//! frames until the server reports `SessionFinished`. Audio chunks are
//! concatenated in arrival order. The whole exchange runs under one absolute
//! deadline measured from the start of [`ProtocolSession::run`].

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::SpeechConfig;
use super::frame::{self, event, Compression, Frame, MessageType, Serialization};
use super::request::SpeechParams;
use super::transport::{ConnectionHeaders, SpeechTransport, TransportConnection};
use crate::error::{Result, VolcError};

/// Lifecycle of a [`ProtocolSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    RequestSent,
    Streaming,
    Finished,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// Audio produced by a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub audio: Vec<u8>,
    pub chunk_count: usize,
    pub sentence_count: usize,
    pub request_id: String,
}

pub struct ProtocolSession<'a> {
    transport: &'a dyn SpeechTransport,
    config: &'a SpeechConfig,
    params: &'a SpeechParams,
    request_id: String,
    state: SessionState,
    failed_from: Option<SessionState>,
    chunks: Vec<Vec<u8>>,
    sentences: usize,
    cancel: Option<CancellationToken>,
}

impl<'a> ProtocolSession<'a> {
    pub fn new(
        transport: &'a dyn SpeechTransport,
        config: &'a SpeechConfig,
        params: &'a SpeechParams,
    ) -> Self {
        Self {
            transport,
            config,
            params,
            request_id: Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            failed_from: None,
            chunks: Vec::new(),
            sentences: 0,
            cancel: None,
        }
    }

    /// Abort the session early when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// State the session was in when it failed.
    pub fn failed_from(&self) -> Option<SessionState> {
        self.failed_from
    }

    /// Correlation id sent as `X-Api-Request-Id`.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Run the exchange to completion.
    ///
    /// A session runs once; calling `run` again returns `InvalidState`.
    pub async fn run(&mut self) -> Result<SynthesizedAudio> {
        if self.state != SessionState::Idle {
            return Err(VolcError::InvalidState(format!(
                "speech session {} already ran (state {:?})",
                self.request_id, self.state
            )));
        }

        let deadline = Instant::now() + self.config.session_timeout;
        match self.drive(deadline).await {
            Ok(audio) => {
                self.state = SessionState::Finished;
                debug!(
                    request_id = %self.request_id,
                    bytes = audio.audio.len(),
                    chunks = audio.chunk_count,
                    "speech session finished"
                );
                Ok(audio)
            }
            Err(error) => {
                warn!(
                    request_id = %self.request_id,
                    state = ?self.state,
                    error = %error,
                    "speech session failed"
                );
                self.failed_from = Some(self.state);
                self.state = SessionState::Failed;
                Err(error)
            }
        }
    }

    async fn drive(&mut self, deadline: Instant) -> Result<SynthesizedAudio> {
        self.state = SessionState::Connecting;
        let transport = self.transport;
        let headers = ConnectionHeaders::for_session(self.config, &self.request_id);
        let mut connection = self
            .bounded(deadline, transport.open(&self.config.endpoint, &headers))
            .await?;

        let outcome = self.exchange(connection.as_mut(), deadline).await;
        if let Err(error) = connection.close().await {
            debug!(request_id = %self.request_id, error = %error, "closing speech connection failed");
        }
        outcome
    }

    async fn exchange(
        &mut self,
        connection: &mut dyn TransportConnection,
        deadline: Instant,
    ) -> Result<SynthesizedAudio> {
        let payload = self.params.to_payload(&self.config.uid)?;
        let request = frame::encode(
            MessageType::SendText,
            Serialization::Json,
            Compression::None,
            0,
            &payload,
        )?;
        self.bounded(deadline, connection.send(request)).await?;
        self.state = SessionState::RequestSent;
        debug!(request_id = %self.request_id, "speech request sent");
        self.state = SessionState::Streaming;

        loop {
            let bytes = self.bounded(deadline, connection.receive_next()).await?;
            let frame = frame::decode(&bytes)?;
            if let Some(audio) = self.handle_frame(frame)? {
                return Ok(audio);
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Option<SynthesizedAudio>> {
        if frame.is_error() {
            return Err(VolcError::DownstreamService {
                code: Some(frame.event_code),
                message: failure_message(&frame.payload),
            });
        }

        match frame.event_code {
            event::TTS_SENTENCE_START => {
                self.sentences += 1;
                debug!(request_id = %self.request_id, "sentence started");
            }
            event::TTS_SENTENCE_END => {
                debug!(request_id = %self.request_id, "sentence ended");
            }
            event::TTS_RESPONSE => {
                debug!(request_id = %self.request_id, bytes = frame.payload.len(), "audio chunk");
                self.chunks.push(frame.payload);
            }
            event::SESSION_FINISHED => {
                let chunks = std::mem::take(&mut self.chunks);
                return Ok(Some(SynthesizedAudio {
                    chunk_count: chunks.len(),
                    audio: chunks.concat(),
                    sentence_count: self.sentences,
                    request_id: self.request_id.clone(),
                }));
            }
            event::SESSION_FAILED => {
                let failure = parse_failure(&frame.payload);
                return Err(VolcError::DownstreamService {
                    code: failure.status_code,
                    message: failure.message,
                });
            }
            other => {
                debug!(request_id = %self.request_id, event = other, "ignoring unrecognized event");
            }
        }
        Ok(None)
    }

    async fn bounded<T>(
        &self,
        deadline: Instant,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = tokio::time::timeout_at(deadline, operation) => match result {
                Ok(result) => result,
                Err(_) => Err(VolcError::Timeout(millis(self.config.session_timeout))),
            },
            _ = cancelled => Err(VolcError::Cancelled("speech session cancelled".into())),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default, Deserialize)]
struct FailurePayload {
    #[serde(default)]
    status_code: Option<u32>,
    #[serde(default, alias = "error")]
    message: String,
}

fn parse_failure(payload: &[u8]) -> FailurePayload {
    match serde_json::from_slice::<FailurePayload>(payload) {
        Ok(failure) if !failure.message.is_empty() => failure,
        Ok(failure) => FailurePayload {
            message: String::from_utf8_lossy(payload).into_owned(),
            ..failure
        },
        Err(_) => FailurePayload {
            status_code: None,
            message: String::from_utf8_lossy(payload).into_owned(),
        },
    }
}

fn failure_message(payload: &[u8]) -> String {
    parse_failure(payload).message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::request::AudioFormat;
    use crate::speech::transport::test_support::{ScriptedTransport, Step};
    use crate::speech::transport::REQUEST_ID_HEADER;
    use pretty_assertions::assert_eq;

    fn config() -> SpeechConfig {
        SpeechConfig::new("app", "key").with_session_timeout(Duration::from_secs(5))
    }

    fn params() -> SpeechParams {
        SpeechParams::new("hello", "X").with_format(AudioFormat::Mp3)
    }

    #[tokio::test]
    async fn concatenates_audio_in_arrival_order() {
        let transport = ScriptedTransport::new(vec![
            Step::event(event::TTS_SENTENCE_START, b"{}"),
            Step::event(event::TTS_RESPONSE, &[0x01, 0x02]),
            Step::event(event::TTS_RESPONSE, &[0x03]),
            Step::event(event::TTS_SENTENCE_END, b"{}"),
            Step::event(event::SESSION_FINISHED, b"{}"),
        ]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let audio = session.run().await.unwrap();

        assert_eq!(audio.audio, vec![0x01, 0x02, 0x03]);
        assert_eq!(audio.chunk_count, 2);
        assert_eq!(audio.sentence_count, 1);
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(transport.observed.close_calls(), 1);
    }

    #[tokio::test]
    async fn sends_exactly_one_json_request_frame() {
        let transport = ScriptedTransport::new(vec![Step::event(event::SESSION_FINISHED, b"")]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);
        session.run().await.unwrap();

        let sent = transport.observed.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let request = frame::decode(&sent[0]).unwrap();
        assert_eq!(request.message_type, MessageType::SendText);
        assert_eq!(request.serialization, Serialization::Json);
        let body: serde_json::Value = serde_json::from_slice(&request.payload).unwrap();
        assert_eq!(body["req_params"]["text"], "hello");
        assert_eq!(body["req_params"]["audio_params"]["format"], "mp3");
    }

    #[tokio::test]
    async fn request_id_header_matches_session() {
        let transport = ScriptedTransport::new(vec![Step::event(event::SESSION_FINISHED, b"")]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);
        let expected = session.request_id().to_string();
        let audio = session.run().await.unwrap();

        let headers = transport.observed.headers.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get(REQUEST_ID_HEADER), Some(expected.as_str()));
        assert_eq!(audio.request_id, expected);
        assert!(Uuid::parse_str(&expected).is_ok());
    }

    #[tokio::test]
    async fn finished_without_audio_yields_empty_buffer() {
        let transport = ScriptedTransport::new(vec![Step::event(event::SESSION_FINISHED, b"")]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let audio = session.run().await.unwrap();
        assert!(audio.audio.is_empty());
        assert_eq!(audio.chunk_count, 0);
    }

    #[tokio::test]
    async fn unknown_events_are_ignored() {
        let transport = ScriptedTransport::new(vec![
            Step::event(9999, b"whatever"),
            Step::event(event::TTS_RESPONSE, &[7]),
            Step::event(event::SESSION_FINISHED, b""),
        ]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        assert_eq!(session.run().await.unwrap().audio, vec![7]);
    }

    #[tokio::test]
    async fn peer_close_before_finish_fails() {
        let transport = ScriptedTransport::new(vec![
            Step::event(event::TTS_RESPONSE, &[1]),
            Step::Close,
        ]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, VolcError::ConnectionClosed(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn malformed_frame_fails_session() {
        let transport = ScriptedTransport::new(vec![Step::Frame(vec![0x11, 0xB4, 0x00])]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, VolcError::FrameTooShort { len: 3, .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(transport.observed.close_calls(), 1);
    }

    #[tokio::test]
    async fn session_failed_event_surfaces_downstream_error() {
        let transport = ScriptedTransport::new(vec![Step::event(
            event::SESSION_FAILED,
            br#"{"status_code":45000000,"message":"quota exceeded"}"#,
        )]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        match session.run().await.unwrap_err() {
            VolcError::DownstreamService { code, message } => {
                assert_eq!(code, Some(45_000_000));
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_frame_surfaces_downstream_error() {
        let mut bytes = vec![0x11, 0xF0, 0x10, 0x00];
        bytes.extend_from_slice(&55_000_000u32.to_be_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"oops");
        let transport = ScriptedTransport::new(vec![Step::Frame(bytes)]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        match session.run().await.unwrap_err() {
            VolcError::DownstreamService { code, message } => {
                assert_eq!(code, Some(55_000_000));
                assert_eq!(message, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out_and_closes_once() {
        let transport = ScriptedTransport::new(vec![
            Step::event(event::TTS_RESPONSE, &[1]),
            Step::Hang,
        ]);
        let config = SpeechConfig::new("app", "key").with_session_timeout(Duration::from_millis(50));
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, VolcError::Timeout(50)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(transport.observed.close_calls(), 1);
    }

    #[tokio::test]
    async fn connect_failure_leaves_session_failed() {
        let transport = ScriptedTransport::failing("connection refused");
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, VolcError::Connect(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(transport.observed.close_calls(), 0);
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let transport = ScriptedTransport::new(vec![Step::event(event::SESSION_FINISHED, b"")]);
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);
        session.run().await.unwrap();

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, VolcError::InvalidState(_)));
        assert_eq!(transport.observed.open_calls(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_a_hanging_session() {
        let transport = ScriptedTransport::new(vec![Step::Hang]);
        let config = config();
        let params = params();
        let token = CancellationToken::new();
        let mut session =
            ProtocolSession::new(&transport, &config, &params).with_cancellation(token.clone());

        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            token.cancel();
        });

        let err = session.run().await.unwrap_err();
        handle.await.unwrap();
        assert!(matches!(err, VolcError::Cancelled(_)), "{err:?}");
        assert!(!err.is_retryable());
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(transport.observed.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_before_first_frame_fails_from_streaming() {
        let transport = ScriptedTransport::new(vec![Step::Hang]);
        let config = SpeechConfig::new("app", "key").with_session_timeout(Duration::from_millis(50));
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, VolcError::Timeout(50)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.failed_from(), Some(SessionState::Streaming));
        assert_eq!(transport.observed.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_failure_is_recorded_as_connecting() {
        let transport = ScriptedTransport::failing("connection refused");
        let config = config();
        let params = params();
        let mut session = ProtocolSession::new(&transport, &config, &params);

        session.run().await.unwrap_err();
        assert_eq!(session.failed_from(), Some(SessionState::Connecting));
    }
}
