//! Synthesis request parameters and their wire JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VolcError};

pub const DEFAULT_SPEAKER: &str = "zh_female_shuangkuaisisi_moon_bigtts";
pub const DEFAULT_MODEL: &str = "seed-tts-1.1";
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_BIT_RATE: u32 = 128_000;

/// Sample rates the service accepts.
pub const SUPPORTED_SAMPLE_RATES: [u32; 7] = [8_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000];

/// Audio encoding returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Mp3,
    OggOpus,
    Pcm,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::OggOpus => "ogg_opus",
            Self::Pcm => "pcm",
        }
    }

    /// MIME type attached to binary output.
    pub fn mime_type(self) -> String {
        format!("audio/{}", self.as_str())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = VolcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "ogg_opus" | "ogg" | "opus" => Ok(Self::OggOpus),
            "pcm" => Ok(Self::Pcm),
            other => Err(VolcError::InvalidArgument(format!(
                "Unsupported audio format: {other}"
            ))),
        }
    }
}

/// Voice emotion; only some speakers support it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emotion {
    pub name: String,
    /// Intensity, 1..=5.
    pub scale: u8,
}

/// Parameters of one synthesis. Immutable once handed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechParams {
    pub text: String,
    pub speaker: String,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub bit_rate: u32,
    /// -50..=100, where 100 is 2.0x and -50 is 0.5x.
    pub speech_rate: i32,
    /// Loudness, same scale as `speech_rate`.
    pub volume: i32,
    pub emotion: Option<Emotion>,
    pub enable_timestamp: bool,
    pub model: Option<String>,
    /// Free-form `req_params.additions` entries.
    pub additions: BTreeMap<String, Value>,
}

impl SpeechParams {
    pub fn new(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.into(),
            format: AudioFormat::Mp3,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bit_rate: DEFAULT_BIT_RATE,
            speech_rate: 0,
            volume: 0,
            emotion: None,
            enable_timestamp: false,
            model: Some(DEFAULT_MODEL.to_string()),
            additions: BTreeMap::new(),
        }
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_speech_rate(mut self, rate: i32) -> Self {
        self.speech_rate = rate;
        self
    }

    pub fn with_volume(mut self, volume: i32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_emotion(mut self, name: impl Into<String>, scale: u8) -> Self {
        self.emotion = Some(Emotion {
            name: name.into(),
            scale,
        });
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.enable_timestamp = enabled;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_addition(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additions.insert(key.into(), value.into());
        self
    }

    /// Trailing silence in milliseconds (0..=30000). Zero is omitted.
    pub fn with_silence_duration(self, millis: u32) -> Self {
        if millis == 0 {
            return self;
        }
        self.with_addition("silence_duration", millis)
    }

    pub fn with_language_detector(self, enabled: bool) -> Self {
        self.with_flag("enable_language_detector", enabled)
    }

    pub fn with_markdown_filter_disabled(self, disabled: bool) -> Self {
        self.with_flag("disable_markdown_filter", disabled)
    }

    pub fn with_emoji_filter_disabled(self, disabled: bool) -> Self {
        self.with_flag("disable_emoji_filter", disabled)
    }

    pub fn with_explicit_language(self, language: impl Into<String>) -> Self {
        self.with_non_empty("explicit_language", language.into())
    }

    pub fn with_context_language(self, language: impl Into<String>) -> Self {
        self.with_non_empty("context_language", language.into())
    }

    fn with_flag(self, key: &str, enabled: bool) -> Self {
        if enabled {
            self.with_addition(key, true)
        } else {
            self
        }
    }

    fn with_non_empty(self, key: &str, value: String) -> Self {
        if value.trim().is_empty() {
            self
        } else {
            self.with_addition(key, value)
        }
    }

    /// Emotion with a non-blank name, if any.
    pub fn effective_emotion(&self) -> Option<&Emotion> {
        self.emotion
            .as_ref()
            .filter(|emotion| !emotion.name.trim().is_empty())
    }

    /// Model with a non-blank name, if any.
    pub fn effective_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(VolcError::InvalidArgument(
                "Speech text cannot be empty".into(),
            ));
        }
        if self.speaker.trim().is_empty() {
            return Err(VolcError::InvalidArgument(
                "Speaker cannot be empty".into(),
            ));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(VolcError::InvalidArgument(format!(
                "Unsupported sample rate: {}",
                self.sample_rate
            )));
        }
        if !(16_000..=320_000).contains(&self.bit_rate) {
            return Err(VolcError::InvalidArgument(
                "Bit rate must be between 16000 and 320000".into(),
            ));
        }
        if !(-50..=100).contains(&self.speech_rate) {
            return Err(VolcError::InvalidArgument(
                "Speech rate must be between -50 and 100".into(),
            ));
        }
        if !(-50..=100).contains(&self.volume) {
            return Err(VolcError::InvalidArgument(
                "Volume must be between -50 and 100".into(),
            ));
        }
        if let Some(emotion) = self.effective_emotion() {
            if !(1..=5).contains(&emotion.scale) {
                return Err(VolcError::InvalidArgument(
                    "Emotion scale must be between 1 and 5".into(),
                ));
            }
        }
        if let Some(silence) = self.additions.get("silence_duration") {
            let in_range = silence
                .as_u64()
                .map(|ms| ms <= 30_000)
                .unwrap_or(false);
            if !in_range {
                return Err(VolcError::InvalidArgument(
                    "Silence duration must be between 0 and 30000 ms".into(),
                ));
            }
        }
        Ok(())
    }

    /// Normalized parameters that identify the produced audio.
    ///
    /// Blank emotion and model collapse to absent, matching what the
    /// server actually receives.
    pub fn cache_fingerprint(&self) -> Value {
        let emotion = self.effective_emotion();
        serde_json::json!({
            "text": self.text,
            "speaker": self.speaker,
            "audio_params": {
                "format": self.format.as_str(),
                "sample_rate": self.sample_rate,
                "bit_rate": self.bit_rate,
                "speech_rate": self.speech_rate,
                "loudness_rate": self.volume,
                "enable_timestamp": self.enable_timestamp,
                "emotion": emotion.map(|e| e.name.as_str()),
                "emotion_scale": emotion.map(|e| e.scale),
            },
            "model": self.effective_model(),
            "additions": self.additions,
        })
    }

    /// Serialize the single outbound request body.
    pub fn to_payload(&self, uid: &str) -> Result<Vec<u8>> {
        let emotion = self.effective_emotion();
        let payload = RequestPayload {
            user: UserInfo { uid },
            req_params: ReqParams {
                text: &self.text,
                speaker: &self.speaker,
                audio_params: AudioParamsBody {
                    format: self.format.as_str(),
                    sample_rate: self.sample_rate,
                    bit_rate: self.bit_rate,
                    speech_rate: self.speech_rate,
                    loudness_rate: self.volume,
                    enable_timestamp: self.enable_timestamp,
                    emotion: emotion.map(|e| e.name.as_str()),
                    emotion_scale: emotion.map(|e| e.scale),
                },
                model: self.effective_model(),
                additions: &self.additions,
            },
        };
        Ok(serde_json::to_vec(&payload)?)
    }
}

#[derive(Serialize)]
struct RequestPayload<'a> {
    user: UserInfo<'a>,
    req_params: ReqParams<'a>,
}

#[derive(Serialize)]
struct UserInfo<'a> {
    uid: &'a str,
}

#[derive(Serialize)]
struct ReqParams<'a> {
    text: &'a str,
    speaker: &'a str,
    audio_params: AudioParamsBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    additions: &'a BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct AudioParamsBody<'a> {
    format: &'a str,
    sample_rate: u32,
    bit_rate: u32,
    speech_rate: i32,
    loudness_rate: i32,
    enable_timestamp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion_scale: Option<u8>,
}
