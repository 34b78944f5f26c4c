//! Convenience re-exports for common use.

pub use crate::cache::{CacheKeySettings, CacheStore, FileCacheStore, MemoryCacheStore};
pub use crate::chat::{ChatClient, ChatCompletionRequest, ChatMessage, ChatOptions, Role};
pub use crate::config::VolcConfig;
pub use crate::error::{Result, VolcError};
pub use crate::image::{ImageClient, ImageGenerationRequest, ImageOutputMode};
pub use crate::output::{OutputMode, OutputPayload};
pub use crate::provider::ArkClient;
pub use crate::speech::request::DEFAULT_SPEAKER;
pub use crate::speech::{
    AudioFormat, SpeechConfig, SpeechOutput, SpeechParams, SpeechSynthesizer, SynthesisRequest,
};
pub use crate::util::retry::RetryPolicy;
