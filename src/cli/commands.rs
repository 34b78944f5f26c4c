//! Subcommand handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::{CacheArgs, ChatArgs, ImageArgs, ModelsArgs, SpeakArgs};
use crate::cache::{CacheKeySettings, FileCacheStore};
use crate::chat::{ChatClient, ChatCompletionRequest, ChatMessage, ChatOptions};
use crate::config::VolcConfig;
use crate::image::{ImageClient, ImageGenerationRequest, ImageOutputMode, SequentialGeneration};
use crate::models::{search_image_models, search_models};
use crate::output::OutputMode;
use crate::provider::ArkClient;
use crate::speech::{AudioFormat, SpeechConfig, SpeechParams, SpeechSynthesizer, SynthesisRequest};

type CliResult = Result<(), Box<dyn std::error::Error>>;

const DEFAULT_AUDIO_CACHE_DIR: &str = "./cache/audio";
const DEFAULT_IMAGE_CACHE_DIR: &str = "./cache/image";

impl CacheArgs {
    fn key_settings(&self) -> Option<CacheKeySettings> {
        if !self.cache {
            return None;
        }
        Some(match &self.cache_key {
            Some(key) => CacheKeySettings::Custom {
                key: key.clone(),
                hash: !self.raw_cache_key,
            },
            None => CacheKeySettings::Auto {
                additional_params: self.cache_salt.clone().unwrap_or_default(),
            },
        })
    }

    fn store(&self, config: &VolcConfig, kind_default: &str) -> Option<Arc<FileCacheStore>> {
        if !self.cache {
            return None;
        }
        let dir = self
            .cache_dir
            .clone()
            .or_else(|| config.cache_dir())
            .unwrap_or_else(|| PathBuf::from(kind_default));
        Some(Arc::new(FileCacheStore::new(dir)))
    }
}

pub async fn handle_speak(args: SpeakArgs) -> CliResult {
    let config = VolcConfig::global();
    let mut speech_config = SpeechConfig::from_config(config)?;
    if let Some(ms) = args.timeout_ms {
        speech_config = speech_config.with_session_timeout(std::time::Duration::from_millis(ms));
    }

    let format: AudioFormat = args.format.parse()?;
    let mut params = SpeechParams::new(&args.text, &args.speaker)
        .with_format(format)
        .with_sample_rate(args.sample_rate)
        .with_bit_rate(args.bit_rate)
        .with_speech_rate(args.speech_rate)
        .with_volume(args.volume);
    if let Some(emotion) = &args.emotion {
        params = params.with_emotion(emotion.clone(), args.emotion_scale);
    }
    if args.model.is_some() {
        params = params.with_model(args.model.clone());
    }
    if let Some(ms) = args.silence_ms {
        params = params.with_silence_duration(ms);
    }

    let output = if args.base64 {
        OutputMode::Base64
    } else {
        OutputMode::File(
            args.out
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("synthesized_audio.{format}"))),
        )
    };

    let mut request = SynthesisRequest::new(params).with_output(output);
    if let Some(settings) = args.cache.key_settings() {
        request = request.with_cache(settings);
    }

    let mut synthesizer = SpeechSynthesizer::websocket(speech_config);
    if let Some(store) = args.cache.store(config, DEFAULT_AUDIO_CACHE_DIR) {
        debug!(dir = %store.dir().display(), "speech cache enabled");
        synthesizer = synthesizer.with_cache(store);
    }

    let result = synthesizer.synthesize(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn handle_chat(args: ChatArgs) -> CliResult {
    let client = ChatClient::new(ArkClient::from_config(VolcConfig::global())?);

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(args.prompt));

    let mut request = ChatCompletionRequest::new(args.model, messages).with_options(ChatOptions {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        ..ChatOptions::default()
    });
    if args.raw {
        request = request.raw_output();
    }

    let output = client.complete(&request).await?;
    match (args.raw, output.first_content()) {
        (false, Some(content)) => println!("{content}"),
        _ => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}

pub async fn handle_image(args: ImageArgs) -> CliResult {
    let config = VolcConfig::global();
    let mut client = ImageClient::new(ArkClient::from_config(config)?);
    if let Some(store) = args.cache.store(config, DEFAULT_IMAGE_CACHE_DIR) {
        client = client.with_cache(store);
    }

    let output = match &args.out {
        Some(path) => ImageOutputMode::Media(OutputMode::File(path.clone())),
        None => ImageOutputMode::Url,
    };
    let mut request = ImageGenerationRequest::new(&args.model, &args.prompt)
        .with_watermark(!args.no_watermark)
        .with_seed(args.seed)
        .with_guidance_scale(args.guidance_scale)
        .with_output(output);
    if let Some(size) = &args.size {
        request = request.with_size(size.clone());
    }
    if let Some(image) = &args.image {
        request = request.with_image(image.clone());
    }
    if let Some(max_images) = args.max_images {
        request = request.with_sequential(SequentialGeneration::Auto { max_images });
    }
    if let Some(settings) = args.cache.key_settings() {
        request = request.with_cache(settings);
    }

    let result = client.generate(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub fn handle_models(args: ModelsArgs) -> CliResult {
    let models = if args.image {
        search_image_models(args.filter.as_deref())
    } else {
        search_models(args.filter.as_deref())
    };
    for model in models {
        println!("{:<40} {}", model.id, model.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_settings_follow_flags() {
        let off = CacheArgs::default();
        assert_eq!(off.key_settings(), None);

        let auto = CacheArgs {
            cache: true,
            cache_salt: Some("v2".into()),
            ..CacheArgs::default()
        };
        assert_eq!(
            auto.key_settings(),
            Some(CacheKeySettings::Auto {
                additional_params: "v2".into()
            })
        );

        let custom = CacheArgs {
            cache: true,
            cache_key: Some("k".into()),
            raw_cache_key: true,
            ..CacheArgs::default()
        };
        assert_eq!(
            custom.key_settings(),
            Some(CacheKeySettings::Custom {
                key: "k".into(),
                hash: false
            })
        );
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let args = CacheArgs {
            cache: true,
            cache_dir: Some(PathBuf::from("/tmp/explicit")),
            ..CacheArgs::default()
        };
        let config = VolcConfig::new();
        config.set(crate::config::ConfigKey::CacheDir, "/tmp/from-config");

        let store = args.store(&config, DEFAULT_AUDIO_CACHE_DIR).unwrap();
        assert_eq!(store.dir(), std::path::Path::new("/tmp/explicit"));

        let no_dir = CacheArgs {
            cache: true,
            ..CacheArgs::default()
        };
        let store = no_dir.store(&config, DEFAULT_AUDIO_CACHE_DIR).unwrap();
        assert_eq!(store.dir(), std::path::Path::new("/tmp/from-config"));
    }
}
