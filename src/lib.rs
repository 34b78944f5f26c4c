//! volc-ai: Volcengine AI client
//!
//! Async access to the Volcengine platform: streaming text-to-speech over the
//! binary WebSocket protocol, chat completion and image generation over the
//! Ark REST API. Results can be cached on disk and returned as raw bytes,
//! base64, a buffer summary, or a written file.
//!
//! # Quick Start
//!
//! ```no_run
//! use volc_ai::prelude::*;
//!
//! # async fn example() -> volc_ai::error::Result<()> {
//! let speech = SpeechConfig::from_config(VolcConfig::global())?;
//! let synthesizer = SpeechSynthesizer::websocket(speech);
//! let request = SynthesisRequest::new(SpeechParams::new("Hello!", DEFAULT_SPEAKER))
//!     .with_output(OutputMode::File("hello.mp3".into()));
//! let output = synthesizer.synthesize(&request).await?;
//! println!("{} bytes", output.audio_size);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod image;
pub mod models;
pub mod output;
pub mod prelude;
pub mod provider;
pub mod speech;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
