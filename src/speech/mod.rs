//! Streaming text-to-speech over the Volcengine binary protocol.
//!
//! ```no_run
//! use volc_ai::speech::{SpeechConfig, SpeechParams, SpeechSynthesizer, SynthesisRequest};
//!
//! # async fn demo() -> volc_ai::error::Result<()> {
//! let synthesizer = SpeechSynthesizer::websocket(SpeechConfig::new("app-id", "access-key"));
//! let output = synthesizer
//!     .synthesize(&SynthesisRequest::new(SpeechParams::new("你好", "zh_female_shuangkuaisisi_moon_bigtts")))
//!     .await?;
//! println!("{} bytes", output.audio_size);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod frame;
pub mod request;
pub mod session;
pub mod synthesizer;
pub mod transport;

pub use config::{AppHeader, SpeechConfig};
pub use frame::{Compression, Frame, MessageType, Serialization};
pub use request::{AudioFormat, Emotion, SpeechParams};
pub use session::{ProtocolSession, SessionState, SynthesizedAudio};
pub use synthesizer::{SpeechOutput, SpeechSynthesizer, SynthesisRequest};
#[cfg(feature = "speech")]
pub use transport::WebSocketTransport;
pub use transport::{ConnectionHeaders, SpeechTransport, TransportConnection};
