//! Image generation over the Ark `/images/generations` endpoint.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cache::{compute_key, CacheKeySettings, CacheStore};
use crate::error::{Result, VolcError};
use crate::output::{self, numbered_path, MediaMeta, OutputMode, OutputPayload};
use crate::provider::ArkClient;

pub const DEFAULT_IMAGE_MODEL: &str = "doubao-seedream-4-0-250828";

/// Models that accept `seed` and `guidance_scale`.
const SEEDED_MODELS: [&str; 2] = ["doubao-seedream-3-0-t2i-250415", "doubao-seededit-3-0-i2i-250628"];
const SEQUENTIAL_MODEL_PREFIX: &str = "doubao-seedream-4-0";

const IMAGE_FORMAT: &str = "jpg";
const IMAGE_MIME: &str = "image/jpeg";
const MANIFEST_FORMAT: &str = "json";
/// Upper bound on the images cached under one key.
const MAX_CACHED_IMAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequentialGeneration {
    #[default]
    Disabled,
    /// Let the model produce a related series of up to `max_images`.
    Auto { max_images: u32 },
}

/// Requested image representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageOutputMode {
    /// Hosted URLs as returned by the API; never cached.
    #[default]
    Url,
    /// The raw API response with inline base64 data.
    Json,
    /// Decoded bytes, assembled per image.
    Media(OutputMode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    /// Reference image URL(s) or data URIs, comma-separated.
    pub image: Option<String>,
    pub size: Option<String>,
    pub watermark: bool,
    /// `-1` lets the service choose.
    pub seed: i64,
    /// `0` keeps the model default.
    pub guidance_scale: f32,
    pub sequential: SequentialGeneration,
    pub output: ImageOutputMode,
    /// `None` disables caching.
    pub cache: Option<CacheKeySettings>,
}

impl ImageGenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            image: None,
            size: None,
            watermark: true,
            seed: -1,
            guidance_scale: 0.0,
            sequential: SequentialGeneration::Disabled,
            output: ImageOutputMode::Url,
            cache: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn with_sequential(mut self, sequential: SequentialGeneration) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_output(mut self, output: ImageOutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_cache(mut self, settings: CacheKeySettings) -> Self {
        self.cache = Some(settings);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(VolcError::InvalidArgument("Model cannot be empty".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(VolcError::InvalidArgument("Prompt cannot be empty".into()));
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale < 0.0 {
            return Err(VolcError::InvalidArgument(
                "Guidance scale must be a non-negative number".into(),
            ));
        }
        if let SequentialGeneration::Auto { max_images } = self.sequential {
            if !(1..=15).contains(&max_images) {
                return Err(VolcError::InvalidArgument(
                    "max_images must be between 1 and 15".into(),
                ));
            }
        }
        Ok(())
    }

    /// One entry becomes a string, several become a list.
    fn image_value(&self) -> Option<Value> {
        let list: Vec<&str> = self
            .image
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        match list.as_slice() {
            [] => None,
            [single] => Some(Value::String((*single).to_string())),
            many => Some(json!(many)),
        }
    }

    fn size_value(&self) -> Option<&str> {
        self.size.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn build_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert("prompt".into(), json!(self.prompt));
        body.insert("watermark".into(), json!(self.watermark));
        if let Some(image) = self.image_value() {
            body.insert("image".into(), image);
        }
        if let Some(size) = self.size_value() {
            body.insert("size".into(), json!(size));
        }

        if SEEDED_MODELS.contains(&self.model.as_str()) {
            if self.seed != -1 {
                body.insert("seed".into(), json!(self.seed));
            }
            if self.guidance_scale > 0.0 {
                body.insert("guidance_scale".into(), json!(self.guidance_scale));
            }
        }
        if self.model.starts_with(SEQUENTIAL_MODEL_PREFIX) {
            match self.sequential {
                SequentialGeneration::Disabled => {
                    body.insert("sequential_image_generation".into(), json!("disabled"));
                }
                SequentialGeneration::Auto { max_images } => {
                    body.insert("sequential_image_generation".into(), json!("auto"));
                    body.insert(
                        "sequential_image_generation_options".into(),
                        json!({ "max_images": max_images }),
                    );
                }
            }
        }

        let response_format = match self.output {
            ImageOutputMode::Url => "url",
            _ => "b64_json",
        };
        body.insert("response_format".into(), json!(response_format));
        Value::Object(body)
    }

    fn cache_fingerprint(&self) -> Value {
        let (sequential, max_images) = match self.sequential {
            SequentialGeneration::Disabled => ("disabled", None),
            SequentialGeneration::Auto { max_images } => ("auto", Some(max_images)),
        };
        json!({
            "model": self.model,
            "prompt": self.prompt,
            "image": self.image_value(),
            "size": self.size_value(),
            "sequential_image_generation": sequential,
            "max_images": max_images,
            "watermark": self.watermark,
            "seed": self.seed,
            "guidance_scale": self.guidance_scale,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "output_mode", rename_all = "snake_case")]
pub enum ImageResult {
    Url { images: Vec<ImageUrl> },
    Json { response: Value },
    Media { images: Vec<OutputPayload> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    pub cached: bool,
    pub completed_at: DateTime<Utc>,
    pub result: ImageResult,
}

impl ImageOutput {
    pub fn image_count(&self) -> usize {
        match &self.result {
            ImageResult::Url { images } => images.len(),
            ImageResult::Media { images } => images.len(),
            ImageResult::Json { response } => response
                .get("data")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
        }
    }
}

#[derive(Clone)]
pub struct ImageClient {
    ark: ArkClient,
    cache: Option<Arc<dyn CacheStore>>,
}

impl ImageClient {
    pub fn new(ark: ArkClient) -> Self {
        Self { ark, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn generate(&self, request: &ImageGenerationRequest) -> Result<ImageOutput> {
        request.validate()?;

        let cache = match (&self.cache, &request.cache, &request.output) {
            (_, _, ImageOutputMode::Url) => None,
            (Some(store), Some(settings), _) => {
                Some((store, compute_key(&request.cache_fingerprint(), settings)?))
            }
            _ => None,
        };

        if let Some((store, key)) = &cache {
            let cached = read_cached(store.as_ref(), key).await;
            if !cached.is_empty() {
                info!(key = %key, images = cached.len(), "image cache hit");
                let mode = match &request.output {
                    ImageOutputMode::Media(mode) => mode.clone(),
                    _ => OutputMode::Base64,
                };
                let images = assemble_images(cached, &mode).await?;
                return Ok(ImageOutput {
                    model: Some(request.model.clone()),
                    created: None,
                    usage: None,
                    cached: true,
                    completed_at: Utc::now(),
                    result: ImageResult::Media { images },
                });
            }
            debug!(key = %key, "image cache miss");
        }

        let response = self
            .ark
            .post_json("images/generations", &request.build_body())
            .await?;
        let model = response.get("model").and_then(Value::as_str).map(str::to_string);
        let created = response.get("created").and_then(Value::as_i64);
        let usage = response.get("usage").cloned();
        let data = response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let result = match &request.output {
            ImageOutputMode::Url => ImageResult::Url {
                images: data
                    .iter()
                    .filter_map(|item| {
                        let url = item.get("url")?.as_str()?;
                        Some(ImageUrl {
                            url: url.to_string(),
                            size: item.get("size").and_then(Value::as_str).map(str::to_string),
                        })
                    })
                    .collect(),
            },
            ImageOutputMode::Json => ImageResult::Json { response },
            ImageOutputMode::Media(mode) => {
                let buffers = self.decode_images(&data).await?;
                if let Some((store, key)) = &cache {
                    write_cached(store.as_ref(), key, &buffers).await;
                }
                ImageResult::Media {
                    images: assemble_images(buffers, mode).await?,
                }
            }
        };

        Ok(ImageOutput {
            model,
            created,
            usage,
            cached: false,
            completed_at: Utc::now(),
            result,
        })
    }

    async fn decode_images(&self, data: &[Value]) -> Result<Vec<Vec<u8>>> {
        let mut buffers = Vec::with_capacity(data.len());
        for (index, item) in data.iter().enumerate() {
            if let Some(encoded) = item.get("b64_json").and_then(Value::as_str) {
                let bytes = STANDARD.decode(encoded).map_err(|error| {
                    VolcError::InvalidState(format!("Image {} has invalid base64: {error}", index + 1))
                })?;
                buffers.push(bytes);
            } else if let Some(url) = item.get("url").and_then(Value::as_str) {
                debug!(index, url, "downloading image");
                buffers.push(self.ark.download(url).await?);
            } else {
                warn!(index, "image entry carries no data");
            }
        }
        Ok(buffers)
    }
}

fn cache_entry_key(key: &str, index: usize) -> String {
    format!("{key}_{index}")
}

/// Written after every `<key>_<n>` entry; names how many belong to the set.
#[derive(Debug, Serialize, Deserialize)]
struct CacheManifest {
    images: usize,
}

/// Read the image set named by the manifest. Any gap is a miss.
async fn read_cached(store: &dyn CacheStore, key: &str) -> Vec<Vec<u8>> {
    let count = match store.lookup(key, MANIFEST_FORMAT).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<CacheManifest>(&bytes) {
            Ok(manifest) if (1..=MAX_CACHED_IMAGES).contains(&manifest.images) => manifest.images,
            Ok(manifest) => {
                warn!(key = %key, images = manifest.images, "ignoring image cache manifest");
                return Vec::new();
            }
            Err(error) => {
                warn!(key = %key, error = %error, "unreadable image cache manifest");
                return Vec::new();
            }
        },
        Ok(None) => return Vec::new(),
        Err(error) => {
            warn!(key = %key, error = %error, "image cache lookup failed");
            return Vec::new();
        }
    };

    let mut buffers = Vec::with_capacity(count);
    for index in 0..count {
        match store.lookup(&cache_entry_key(key, index), IMAGE_FORMAT).await {
            Ok(Some(bytes)) => buffers.push(bytes),
            Ok(None) => {
                debug!(key = %key, index, expected = count, "image cache entry missing");
                return Vec::new();
            }
            Err(error) => {
                warn!(key = %key, index, error = %error, "image cache lookup failed");
                return Vec::new();
            }
        }
    }
    buffers
}

/// Replace the cached set for `key`. The old manifest goes first and the new
/// one is written last, so an interrupted write leaves a miss.
async fn write_cached(store: &dyn CacheStore, key: &str, buffers: &[Vec<u8>]) {
    if buffers.is_empty() || buffers.len() > MAX_CACHED_IMAGES {
        debug!(key = %key, images = buffers.len(), "not caching image set");
        return;
    }
    if let Err(error) = store.remove(key, MANIFEST_FORMAT).await {
        warn!(key = %key, error = %error, "image cache manifest removal failed");
        return;
    }
    for (index, bytes) in buffers.iter().enumerate() {
        if let Err(error) = store
            .store(&cache_entry_key(key, index), IMAGE_FORMAT, bytes)
            .await
        {
            warn!(key = %key, index, error = %error, "image cache store failed");
            return;
        }
    }

    let manifest = match serde_json::to_vec(&CacheManifest {
        images: buffers.len(),
    }) {
        Ok(manifest) => manifest,
        Err(error) => {
            warn!(key = %key, error = %error, "image cache manifest encoding failed");
            return;
        }
    };
    if let Err(error) = store.store(key, MANIFEST_FORMAT, &manifest).await {
        warn!(key = %key, error = %error, "image cache manifest store failed");
    }
}

async fn assemble_images(buffers: Vec<Vec<u8>>, mode: &OutputMode) -> Result<Vec<OutputPayload>> {
    let count = buffers.len();
    let mut images = Vec::with_capacity(count);
    for (index, bytes) in buffers.into_iter().enumerate() {
        let meta = MediaMeta {
            format: IMAGE_FORMAT.to_string(),
            mime_type: IMAGE_MIME.to_string(),
            file_name: format!("generated_image_{index}.{IMAGE_FORMAT}"),
            sample_rate: None,
        };
        let mode = match mode {
            OutputMode::File(path) if count > 1 => OutputMode::File(numbered_path(path, index)),
            other => other.clone(),
        };
        images.push(output::assemble(bytes, &mode, &meta).await?);
    }
    Ok(images)
}
