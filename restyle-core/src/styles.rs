//! Style Catalog - Named Visual Styles
//!
//! The catalog is built once at startup and shared read-only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub type StyleKey = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDefinition {
    pub key: StyleKey,
    pub display_name: String,
    /// Attributes the model should aim for.
    pub positive: String,
    /// Attributes the model should avoid.
    pub negative: String,
}

impl StyleDefinition {
    pub fn new(key: &str, display_name: &str, positive: &str, negative: &str) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            positive: positive.to_string(),
            negative: negative.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate style key: {0}")]
    DuplicateKey(String),

    #[error("Duplicate style display name: {0}")]
    DuplicateDisplayName(String),

    #[error("Style {0:?} has an empty {1}")]
    EmptyField(String, &'static str),

    #[error("Failed to read style catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse style catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Style catalog - dual addressing by display name or key
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: Vec<StyleDefinition>,
    by_key: HashMap<StyleKey, usize>,
    by_display_name: HashMap<String, usize>,
}

impl StyleCatalog {
    pub fn new(styles: Vec<StyleDefinition>) -> Result<Self, CatalogError> {
        let mut by_key = HashMap::new();
        let mut by_display_name = HashMap::new();

        for (idx, style) in styles.iter().enumerate() {
            for (value, field) in [
                (&style.key, "key"),
                (&style.display_name, "display name"),
                (&style.positive, "positive descriptor"),
                (&style.negative, "negative descriptor"),
            ] {
                if value.trim().is_empty() {
                    return Err(CatalogError::EmptyField(style.key.clone(), field));
                }
            }
            if by_key.insert(style.key.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateKey(style.key.clone()));
            }
            if by_display_name.insert(style.display_name.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateDisplayName(style.display_name.clone()));
            }
        }

        Ok(Self { styles, by_key, by_display_name })
    }

    /// Catalog from a JSON array of style definitions
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let styles: Vec<StyleDefinition> = serde_json::from_str(content)?;
        Self::new(styles)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The built-in anime style set
    pub fn builtin() -> Self {
        let styles = builtin_styles();
        let by_key = styles.iter().enumerate().map(|(i, s)| (s.key.clone(), i)).collect();
        let by_display_name = styles
            .iter()
            .enumerate()
            .map(|(i, s)| (s.display_name.clone(), i))
            .collect();
        Self { styles, by_key, by_display_name }
    }

    pub fn lookup_by_display_name(&self, name: &str) -> Option<&StyleDefinition> {
        self.by_display_name.get(name).map(|&idx| &self.styles[idx])
    }

    pub fn lookup_by_key(&self, key: &str) -> Option<&StyleDefinition> {
        self.by_key.get(key).map(|&idx| &self.styles[idx])
    }

    /// Resolve a caller-supplied style reference.
    ///
    /// Display names win; the internal key is only consulted when no display
    /// name matches.
    pub fn resolve(&self, name_or_key: &str) -> Option<&StyleDefinition> {
        self.lookup_by_display_name(name_or_key)
            .or_else(|| self.lookup_by_key(name_or_key))
    }

    /// Display names in catalog order
    pub fn display_names(&self) -> Vec<&str> {
        self.styles.iter().map(|s| s.display_name.as_str()).collect()
    }

    /// (display name, key) pairs in catalog order
    pub fn options(&self) -> Vec<(&str, &str)> {
        self.styles
            .iter()
            .map(|s| (s.display_name.as_str(), s.key.as_str()))
            .collect()
    }

    pub fn list(&self) -> &[StyleDefinition] {
        &self.styles
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const COMMON_NEGATIVE: &str = "extra limbs, extra fingers, missing fingers, malformed hands, bad anatomy, distorted face, cross-eye, blurry, jpeg artifacts, watermark, text, logo";

const QUALITY_TAGS: &str = "best quality, masterpiece, anime illustration, high resolution, ultra-detailed";

fn builtin_styles() -> Vec<StyleDefinition> {
    vec![
        StyleDefinition::new(
            "nekomimi_anime",
            "Nekomimi (Kemonomimi)",
            &format!("A nekomimi anime character, human-animal hybrid with soft cat ears and a fluffy tail, large expressive anime eyes with gentle highlights, soft layered hair with natural shine, cute and playful expression with a hint of mischief, slim anime body proportions, fantasy-inspired outfit with soft fabrics and flowing details, warm pastel color palette, clean anime line art, soft shading, kemonomimi anime style, {QUALITY_TAGS}"),
            &format!("realistic human, photorealistic, animal face instead of human, extra ears, extra tails, deformed anatomy, bad proportions, harsh shadows, dull colors, messy line art, {COMMON_NEGATIVE}"),
        ),
        StyleDefinition::new(
            "shonen_anime",
            "Shonen",
            &format!("A shonen anime protagonist with sharp facial features and intense determined eyes, spiky dynamic hairstyle, athletic muscular build, strong heroic posture, battle-ready stance, dramatic lighting with high contrast, bold anime line art, dynamic composition, vivid colors and action-focused atmosphere, classic shonen anime style, {QUALITY_TAGS}"),
            &format!("cute chibi style, soft pastel colors, weak expression, thin fragile body, photorealism, flat lighting, static pose, low detail, {COMMON_NEGATIVE}"),
        ),
        StyleDefinition::new(
            "kawaii_anime",
            "Kawaii",
            &format!("A kawaii anime character with chibi proportions, very large sparkling eyes and rounded facial features, small nose and tiny mouth, soft pastel color palette, cute outfit with playful accessories, innocent cheerful expression, simple clean line art, soft shading, kawaii anime style, {QUALITY_TAGS}"),
            &format!("realistic proportions, muscular body, sharp facial features, dark gritty tones, photorealism, horror style, angry expression, harsh shadows, complex textures, {COMMON_NEGATIVE}"),
        ),
        StyleDefinition::new(
            "mushoku_tensei_anime",
            "Mushoku Tensei",
            &format!("A fantasy anime character in Mushoku Tensei style, large expressive eyes with detailed irises, soft realistic facial proportions, natural skin tones and subtle shading, highly detailed voluminous hair with defined strands, medieval fantasy outfit with fine details, cinematic lighting and depth, immersive anime illustration, {QUALITY_TAGS}"),
            &format!("cartoonish style, chibi proportions, flat shading, simple line art, neon colors, photorealistic skin, plastic texture, low detail, {COMMON_NEGATIVE}"),
        ),
        StyleDefinition::new(
            "ghibli_japanese_anime",
            "Japanese Anime (Ghibli Inspired)",
            "Studio Ghibli style illustration, whimsical atmosphere, lush detailed backgrounds, soft painterly textures, gentle pastel color palette, warm natural lighting, expressive characters with large kind eyes, cinematic composition, smooth shading, hand-painted look, magical and cozy environment, inspired by Hayao Miyazaki, ultra high detail from image, 8k resolution, nostalgic and heartwarming mood.",
            "blurry, low resolution, pixelated, bad anatomy, bad proportions, extra limbs, missing limbs, mutated features, creepy eyes, harsh shadows, overly dark colors, monochrome, grayscale, messy background, distorted scenery, flat colors, rough sketch lines, grainy, overexposed, underexposed, watermark, text, signature, off-style, low detail",
        ),
        StyleDefinition::new(
            "shojo_anime",
            "Shojo",
            &format!("A shojo anime character with large sparkling eyes, delicate facial features and soft expression, long flowing detailed hair, slim elegant proportions, romantic pastel color palette, soft glowing lighting, clean refined anime line art, emotional and dreamy shojo anime style, {QUALITY_TAGS}"),
            &format!("masculine features, muscular body, harsh lighting, gritty textures, dark color palette, photorealism, action battle pose, chibi style, {COMMON_NEGATIVE}"),
        ),
    ]
}
