//! Cache-aware text-to-speech entry point.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SpeechConfig;
use super::request::{AudioFormat, SpeechParams};
use super::session::ProtocolSession;
use super::transport::SpeechTransport;
use crate::cache::{compute_key, CacheKeySettings, CacheStore};
use crate::error::Result;
use crate::output::{self, MediaMeta, OutputMode, OutputPayload};

/// One `synthesize` call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub params: SpeechParams,
    pub output: OutputMode,
    /// `None` bypasses the cache in both directions.
    pub cache: Option<CacheKeySettings>,
}

impl SynthesisRequest {
    pub fn new(params: SpeechParams) -> Self {
        Self {
            params,
            output: OutputMode::default(),
            cache: None,
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_cache(mut self, settings: CacheKeySettings) -> Self {
        self.cache = Some(settings);
        self
    }
}

/// Result summary plus the assembled payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechOutput {
    pub success: bool,
    pub message: String,
    pub text: String,
    pub speaker: String,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub audio_size: usize,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub output: OutputPayload,
}

impl SpeechOutput {
    /// Audio bytes, present for binary output.
    pub fn audio(&self) -> Option<&[u8]> {
        self.output.bytes()
    }
}

pub struct SpeechSynthesizer {
    config: SpeechConfig,
    transport: Arc<dyn SpeechTransport>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl SpeechSynthesizer {
    pub fn new(config: SpeechConfig, transport: Arc<dyn SpeechTransport>) -> Self {
        Self {
            config,
            transport,
            cache: None,
        }
    }

    /// Synthesizer over the WebSocket transport.
    #[cfg(feature = "speech")]
    pub fn websocket(config: SpeechConfig) -> Self {
        Self::new(config, Arc::new(super::transport::WebSocketTransport::new()))
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechOutput> {
        self.run(request, None).await
    }

    /// Like [`synthesize`](Self::synthesize), aborting when `token` fires.
    pub async fn synthesize_with_cancellation(
        &self,
        request: &SynthesisRequest,
        token: CancellationToken,
    ) -> Result<SpeechOutput> {
        self.run(request, Some(token)).await
    }

    async fn run(
        &self,
        request: &SynthesisRequest,
        token: Option<CancellationToken>,
    ) -> Result<SpeechOutput> {
        self.config.validate()?;
        let params = &request.params;
        params.validate()?;
        let format = params.format.as_str();

        let cache = match (&self.cache, &request.cache) {
            (Some(store), Some(settings)) => {
                Some((store, compute_key(&params.cache_fingerprint(), settings)?))
            }
            _ => None,
        };

        if let Some((store, key)) = &cache {
            match store.lookup(key, format).await {
                Ok(Some(bytes)) => {
                    info!(key = %key, bytes = bytes.len(), "speech cache hit");
                    return self
                        .finish(request, bytes, true, store.location(key, format), None)
                        .await;
                }
                Ok(None) => debug!(key = %key, "speech cache miss"),
                Err(error) => warn!(key = %key, error = %error, "speech cache lookup failed"),
            }
        }

        let mut session = ProtocolSession::new(self.transport.as_ref(), &self.config, params);
        if let Some(token) = token {
            session = session.with_cancellation(token);
        }
        let synthesized = session.run().await?;

        let mut cache_path = None;
        if let Some((store, key)) = &cache {
            if synthesized.audio.is_empty() {
                debug!(key = %key, "not caching empty audio");
            } else {
                match store.store(key, format, &synthesized.audio).await {
                    Ok(()) => cache_path = store.location(key, format),
                    Err(error) => warn!(key = %key, error = %error, "speech cache store failed"),
                }
            }
        }

        self.finish(
            request,
            synthesized.audio,
            false,
            cache_path,
            Some(synthesized.request_id),
        )
        .await
    }

    async fn finish(
        &self,
        request: &SynthesisRequest,
        audio: Vec<u8>,
        cached: bool,
        cache_file_path: Option<String>,
        request_id: Option<String>,
    ) -> Result<SpeechOutput> {
        let params = &request.params;
        let meta = MediaMeta {
            format: params.format.as_str().to_string(),
            mime_type: params.format.mime_type(),
            file_name: format!("synthesized_audio.{}", params.format.as_str()),
            sample_rate: Some(params.sample_rate),
        };
        let audio_size = audio.len();
        let output = output::assemble(audio, &request.output, &meta).await?;

        Ok(SpeechOutput {
            success: true,
            message: if cached {
                "Loaded audio from cache".to_string()
            } else {
                "Speech synthesis completed".to_string()
            },
            text: params.text.clone(),
            speaker: params.speaker.clone(),
            format: params.format,
            sample_rate: params.sample_rate,
            audio_size,
            cached,
            cache_file_path,
            request_id,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{FileCacheStore, MemoryCacheStore};
    use crate::error::VolcError;
    use crate::speech::frame::event;
    use crate::speech::transport::test_support::{ScriptedTransport, Step};
    use pretty_assertions::assert_eq;

    fn finished_with(chunks: &[&[u8]]) -> Arc<ScriptedTransport> {
        let mut steps: Vec<Step> = chunks
            .iter()
            .map(|chunk| Step::event(event::TTS_RESPONSE, chunk))
            .collect();
        steps.push(Step::event(event::SESSION_FINISHED, b"{}"));
        Arc::new(ScriptedTransport::new(steps))
    }

    fn config() -> SpeechConfig {
        SpeechConfig::new("app", "key").with_session_timeout(Duration::from_secs(5))
    }

    fn hello() -> SpeechParams {
        SpeechParams::new("hello", "X")
            .with_format(AudioFormat::Mp3)
            .with_sample_rate(24_000)
    }

    #[tokio::test]
    async fn uncached_synthesis_returns_streamed_audio() {
        let transport = finished_with(&[&[0x01], &[0x02]]);
        let synthesizer = SpeechSynthesizer::new(config(), transport.clone());

        let output = synthesizer
            .synthesize(&SynthesisRequest::new(hello()))
            .await
            .unwrap();

        assert_eq!(output.audio(), Some(&[0x01u8, 0x02][..]));
        assert_eq!(output.format, AudioFormat::Mp3);
        assert_eq!(output.audio_size, 2);
        assert!(!output.cached);
        assert!(output.request_id.is_some());
        assert_eq!(transport.observed.open_calls(), 1);
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let transport = finished_with(&[&[7, 7, 7]]);
        let synthesizer = SpeechSynthesizer::new(config(), transport.clone())
            .with_cache(Arc::new(FileCacheStore::new(dir.path())));
        let request = SynthesisRequest::new(hello()).with_cache(CacheKeySettings::default());

        let first = synthesizer.synthesize(&request).await.unwrap();
        let second = synthesizer.synthesize(&request).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.audio(), Some(&[7u8, 7, 7][..]));
        assert_eq!(first.cache_file_path, second.cache_file_path);
        assert_eq!(transport.observed.open_calls(), 1);
    }

    #[tokio::test]
    async fn output_mode_does_not_split_the_cache() {
        let transport = finished_with(&[&[1, 2, 3]]);
        let synthesizer = SpeechSynthesizer::new(config(), transport.clone())
            .with_cache(Arc::new(MemoryCacheStore::new()));
        let binary = SynthesisRequest::new(hello())
            .with_cache(CacheKeySettings::default())
            .with_output(OutputMode::Binary);
        let base64 = SynthesisRequest::new(hello())
            .with_cache(CacheKeySettings::default())
            .with_output(OutputMode::Base64);

        let first = synthesizer.synthesize(&binary).await.unwrap();
        let second = synthesizer.synthesize(&base64).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(transport.observed.open_calls(), 1);
        let json = serde_json::to_value(&second).unwrap();
        assert_eq!(json["output"]["data"], "AQID");
    }

    #[tokio::test]
    async fn caching_disabled_on_request_always_connects() {
        let transport = finished_with(&[&[1]]);
        let synthesizer = SpeechSynthesizer::new(config(), transport.clone())
            .with_cache(Arc::new(MemoryCacheStore::new()));
        let request = SynthesisRequest::new(hello());

        synthesizer.synthesize(&request).await.unwrap();
        synthesizer.synthesize(&request).await.unwrap();

        assert_eq!(transport.observed.open_calls(), 2);
    }

    #[tokio::test]
    async fn empty_audio_is_not_cached() {
        let transport = finished_with(&[]);
        let store = Arc::new(MemoryCacheStore::new());
        let synthesizer =
            SpeechSynthesizer::new(config(), transport.clone()).with_cache(store.clone());
        let request = SynthesisRequest::new(hello()).with_cache(CacheKeySettings::default());

        let output = synthesizer.synthesize(&request).await.unwrap();

        assert_eq!(output.audio_size, 0);
        assert!(store.is_empty());
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn lookup(&self, _key: &str, _format: &str) -> Result<Option<Vec<u8>>> {
            Err(VolcError::cache_io(
                "/nope",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        }

        async fn store(&self, key: &str, _format: &str, _bytes: &[u8]) -> Result<()> {
            Err(VolcError::cache_io(
                key,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        }

        async fn remove(&self, key: &str, _format: &str) -> Result<()> {
            Err(VolcError::cache_io(
                key,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        }
    }

    #[tokio::test]
    async fn cache_failures_do_not_mask_synthesis() {
        let transport = finished_with(&[&[4, 2]]);
        let synthesizer =
            SpeechSynthesizer::new(config(), transport).with_cache(Arc::new(BrokenStore));
        let request = SynthesisRequest::new(hello()).with_cache(CacheKeySettings::default());

        let output = synthesizer.synthesize(&request).await.unwrap();

        assert_eq!(output.audio(), Some(&[4u8, 2][..]));
        assert_eq!(output.cache_file_path, None);
    }

    #[tokio::test]
    async fn invalid_params_fail_before_connecting() {
        let transport = finished_with(&[&[1]]);
        let synthesizer = SpeechSynthesizer::new(config(), transport.clone());
        let request = SynthesisRequest::new(SpeechParams::new("", "X"));

        let err = synthesizer.synthesize(&request).await.unwrap_err();

        assert!(matches!(err, VolcError::InvalidArgument(_)));
        assert_eq!(transport.observed.open_calls(), 0);
    }

    #[tokio::test]
    async fn missing_credentials_are_an_authentication_error() {
        let transport = finished_with(&[&[1]]);
        let synthesizer = SpeechSynthesizer::new(SpeechConfig::new("", "key"), transport);

        let err = synthesizer
            .synthesize(&SynthesisRequest::new(hello()))
            .await
            .unwrap_err();
        assert!(matches!(err, VolcError::Authentication(_)));
    }

    #[tokio::test]
    async fn buffer_info_output_reports_size_only() {
        let transport = finished_with(&[&[1, 2, 3]]);
        let synthesizer = SpeechSynthesizer::new(config(), transport);
        let request = SynthesisRequest::new(hello()).with_output(OutputMode::BufferInfo);

        let output = synthesizer.synthesize(&request).await.unwrap();

        assert_eq!(output.audio(), None);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["output"]["output_mode"], "buffer_info");
        assert_eq!(json["output"]["length"], 3);
        assert_eq!(json["output"]["sample_rate"], 24_000);
    }
}
