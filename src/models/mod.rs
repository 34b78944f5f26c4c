//! Static catalogue of the models the Ark endpoints accept.

use serde::Serialize;

/// A selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

const fn model(id: &'static str, name: &'static str) -> ModelInfo {
    ModelInfo { id, name }
}

/// Chat completion models.
pub const CHAT_MODELS: [ModelInfo; 9] = [
    model("deepseek-v3-1-250821", "DeepSeek V3.1 (250821)"),
    model("doubao-seed-1-6-vision-250815", "Doubao Seed 1.6 Vision (250815)"),
    model("doubao-seed-1-6-250615", "Doubao Seed 1.6 (250615)"),
    model(
        "doubao-1-5-pro-32k-character-250715",
        "Doubao 1.5 Pro 32K Character (250715)",
    ),
    model("doubao-seed-1-6-flash-250828", "Doubao Seed 1.6 Flash (250828)"),
    model("doubao-seed-1-6-flash-250715", "Doubao Seed 1.6 Flash (250715)"),
    model("doubao-seed-1-6-flash-250615", "Doubao Seed 1.6 Flash (250615)"),
    model("kimi-k2-250711", "Kimi K2 (250711)"),
    model("deepseek-v3-250324", "DeepSeek V3 (250324)"),
];

/// Image generation models.
pub const IMAGE_MODELS: [ModelInfo; 3] = [
    model("doubao-seedream-4-0-250828", "Doubao Seedream 4.0 (250828)"),
    model("doubao-seedream-3-0-t2i-250415", "Doubao Seedream 3.0 T2I (250415)"),
    model("doubao-seededit-3-0-i2i-250628", "Doubao SeedEdit 3.0 I2I (250628)"),
];

/// Chat models whose id or name contains `filter` (case-insensitive),
/// sorted by name. `None` or a blank filter returns everything.
pub fn search_models(filter: Option<&str>) -> Vec<ModelInfo> {
    search(&CHAT_MODELS, filter)
}

pub fn search_image_models(filter: Option<&str>) -> Vec<ModelInfo> {
    search(&IMAGE_MODELS, filter)
}

fn search(catalogue: &[ModelInfo], filter: Option<&str>) -> Vec<ModelInfo> {
    let needle = filter
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());
    let mut found: Vec<ModelInfo> = catalogue
        .iter()
        .filter(|model| match &needle {
            Some(needle) => {
                model.id.to_lowercase().contains(needle)
                    || model.name.to_lowercase().contains(needle)
            }
            None => true,
        })
        .copied()
        .collect();
    found.sort_by(|a, b| a.name.cmp(b.name));
    found
}
