use std::fmt;

use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [Self::Square, Self::Portrait, Self::Landscape];

    /// Width divided by height of the target canvas.
    pub fn ratio(self) -> f64 {
        match self {
            Self::Square => 1.0,
            Self::Portrait => 9.0 / 16.0,
            Self::Landscape => 16.0 / 9.0,
        }
    }

    pub fn value(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Square => "Square (1:1)",
            Self::Portrait => "Portrait (9:16)",
            Self::Landscape => "Landscape (16:9)",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LightingStyle {
    #[default]
    Studio,
    Natural,
    Dramatic,
    Soft,
    HighKey,
}

impl LightingStyle {
    pub const ALL: [LightingStyle; 5] = [
        Self::Studio,
        Self::Natural,
        Self::Dramatic,
        Self::Soft,
        Self::HighKey,
    ];

    pub fn value(self) -> &'static str {
        match self {
            Self::Studio => "Studio",
            Self::Natural => "Natural",
            Self::Dramatic => "Dramatic",
            Self::Soft => "Soft",
            Self::HighKey => "High-Key",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Studio => "Studio",
            Self::Natural => "Natural Light",
            Self::Dramatic => "Dramatic",
            Self::Soft => "Soft & Ethereal",
            Self::HighKey => "High-Key",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CameraPerspective {
    #[default]
    EyeLevel,
    HighAngle,
    LowAngle,
    Macro,
    BirdsEye,
}

impl CameraPerspective {
    pub const ALL: [CameraPerspective; 5] = [
        Self::EyeLevel,
        Self::HighAngle,
        Self::LowAngle,
        Self::Macro,
        Self::BirdsEye,
    ];

    pub fn value(self) -> &'static str {
        match self {
            Self::EyeLevel => "Eye-Level",
            Self::HighAngle => "High-Angle",
            Self::LowAngle => "Low-Angle",
            Self::Macro => "Macro",
            Self::BirdsEye => "Bird's-Eye View",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::EyeLevel => "Eye-Level",
            Self::HighAngle => "High-Angle",
            Self::LowAngle => "Low-Angle",
            Self::Macro => "Macro / Close-up",
            Self::BirdsEye => "Bird's-Eye View",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.value()) }
}

impl fmt::Display for LightingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.value()) }
}

impl fmt::Display for CameraPerspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.value()) }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationOptions {
    pub aspect_ratio: AspectRatio,
    pub lighting_style: LightingStyle,
    pub camera_perspective: CameraPerspective,
}

/// Partial update sent by the option selectors. Missing fields keep their value.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct OptionsUpdate {
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default)]
    pub lighting_style: Option<LightingStyle>,
    #[serde(default)]
    pub camera_perspective: Option<CameraPerspective>,
}

impl GenerationOptions {
    pub fn apply(&self, update: &OptionsUpdate) -> Self {
        Self {
            aspect_ratio: update.aspect_ratio.unwrap_or(self.aspect_ratio),
            lighting_style: update.lighting_style.unwrap_or(self.lighting_style),
            camera_perspective: update.camera_perspective.unwrap_or(self.camera_perspective),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    Product,
    Style,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => f.write_str("product"),
            Self::Style => f.write_str("style"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub role: ImageRole,
    pub media_type: String,
    pub bytes: Bytes,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadedImage {
    pub fn new(role: ImageRole, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { role, media_type: media_type.into(), bytes: bytes.into(), uploaded_at: Utc::now() }
    }
}

/// Image payload in transport form: declared media type plus base64 content.
/// Serializes to the `inlineData` shape the generative API expects.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InlineImage {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }

    /// File extension matching the media type, used for the download name.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Succeeded(InlineImage),
    Failed { message: String },
}

/// What the result pane shows. Exactly one variant is live at a time.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultPane {
    Empty,
    Loading,
    Error { message: String },
    Image { data_uri: String, mime_type: String },
}

#[derive(Debug, Serialize, Clone)]
pub struct ImageSummary {
    pub media_type: String,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&UploadedImage> for ImageSummary {
    fn from(image: &UploadedImage) -> Self {
        Self {
            media_type: image.media_type.clone(),
            size_bytes: image.bytes.len(),
            uploaded_at: image.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionView {
    pub id: Uuid,
    pub options: GenerationOptions,
    pub product_image: Option<ImageSummary>,
    pub style_image: Option<ImageSummary>,
    pub style_description: String,
    pub suggestions: Vec<String>,
    pub active_prompt: String,
    pub is_generating: bool,
    pub is_suggesting: bool,
    pub can_generate: bool,
    pub notice: Option<String>,
    pub result: ResultPane,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PromptUpdate {
    pub prompt: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct OptionChoice {
    pub value: serde_json::Value,
    pub label: &'static str,
}

#[derive(Debug, Serialize, Clone)]
pub struct OptionCatalog {
    pub aspect_ratios: Vec<OptionChoice>,
    pub lighting_styles: Vec<OptionChoice>,
    pub camera_perspectives: Vec<OptionChoice>,
}

impl OptionCatalog {
    pub fn build() -> Self {
        fn choice<T: Serialize>(value: T, label: &'static str) -> OptionChoice {
            OptionChoice { value: serde_json::to_value(value).unwrap_or_default(), label }
        }
        Self {
            aspect_ratios: AspectRatio::ALL.iter().map(|v| choice(v, v.label())).collect(),
            lighting_styles: LightingStyle::ALL.iter().map(|v| choice(v, v.label())).collect(),
            camera_perspectives: CameraPerspective::ALL.iter().map(|v| choice(v, v.label())).collect(),
        }
    }
}
