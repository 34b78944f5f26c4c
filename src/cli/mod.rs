//! CLI entry point for volc-ai.

pub mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Volcengine AI CLI
#[derive(Parser, Debug)]
#[command(name = "volc", version, about = "Volcengine speech, chat and image CLI")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize speech from text
    Speak(SpeakArgs),
    /// Chat with a model
    Chat(ChatArgs),
    /// Generate images from a prompt
    Image(ImageArgs),
    /// List available models
    Models(ModelsArgs),
}

/// Cache flags shared by `speak` and `image`.
#[derive(Parser, Debug, Clone, Default)]
pub struct CacheArgs {
    /// Reuse results of identical earlier requests
    #[arg(long)]
    pub cache: bool,

    /// Cache directory (defaults to VOLC_CACHE_DIR or ./cache/<kind>)
    #[arg(long, requires = "cache")]
    pub cache_dir: Option<PathBuf>,

    /// Custom cache key instead of the parameter hash
    #[arg(long, requires = "cache")]
    pub cache_key: Option<String>,

    /// Use the custom key literally instead of hashing it
    #[arg(long, requires = "cache_key")]
    pub raw_cache_key: bool,

    /// Extra string mixed into the automatic cache key
    #[arg(long, requires = "cache", conflicts_with = "cache_key")]
    pub cache_salt: Option<String>,
}

/// Arguments for the `speak` subcommand.
#[derive(Parser, Debug)]
pub struct SpeakArgs {
    /// Text to synthesize
    pub text: String,

    /// Voice id
    #[arg(short, long, default_value = crate::speech::request::DEFAULT_SPEAKER)]
    pub speaker: String,

    /// Audio format (mp3, ogg_opus, pcm)
    #[arg(short, long, default_value = "mp3")]
    pub format: String,

    #[arg(long, default_value_t = crate::speech::request::DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    #[arg(long, default_value_t = crate::speech::request::DEFAULT_BIT_RATE)]
    pub bit_rate: u32,

    /// Speech rate, -50..=100
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub speech_rate: i32,

    /// Loudness, -50..=100
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub volume: i32,

    /// Emotion name (speaker dependent)
    #[arg(long)]
    pub emotion: Option<String>,

    /// Emotion intensity, 1..=5
    #[arg(long, default_value_t = 4)]
    pub emotion_scale: u8,

    /// Model version
    #[arg(long)]
    pub model: Option<String>,

    /// Silence appended after the audio, in milliseconds
    #[arg(long)]
    pub silence_ms: Option<u32>,

    /// Write audio to this path (default ./synthesized_audio.<format>)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print base64 instead of writing a file
    #[arg(long, conflicts_with = "out")]
    pub base64: bool,

    /// Session timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[command(flatten)]
    pub cache: CacheArgs,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// User prompt
    pub prompt: String,

    /// Model id
    #[arg(short, long, default_value = crate::chat::DEFAULT_CHAT_MODEL)]
    pub model: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Max tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print the raw API response
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the `image` subcommand.
#[derive(Parser, Debug)]
pub struct ImageArgs {
    /// Prompt describing the image
    pub prompt: String,

    #[arg(short, long, default_value = crate::image::DEFAULT_IMAGE_MODEL)]
    pub model: String,

    /// Output size, e.g. 2K or 1024x1024
    #[arg(long)]
    pub size: Option<String>,

    /// Reference image URL(s), comma-separated
    #[arg(long)]
    pub image: Option<String>,

    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub seed: i64,

    #[arg(long, default_value_t = 0.0)]
    pub guidance_scale: f32,

    /// Generate a related series of up to N images
    #[arg(long)]
    pub max_images: Option<u32>,

    #[arg(long)]
    pub no_watermark: bool,

    /// Save images to this path (numbered when several)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub cache: CacheArgs,
}

/// Arguments for the `models` subcommand.
#[derive(Parser, Debug)]
pub struct ModelsArgs {
    /// Case-insensitive substring filter
    pub filter: Option<String>,

    /// List image models instead of chat models
    #[arg(long)]
    pub image: bool,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level implied by `-v`.
    pub fn log_level(&self) -> tracing::level_filters::LevelFilter {
        match self.verbose {
            0 => tracing::level_filters::LevelFilter::WARN,
            1 => tracing::level_filters::LevelFilter::DEBUG,
            _ => tracing::level_filters::LevelFilter::TRACE,
        }
    }
}
