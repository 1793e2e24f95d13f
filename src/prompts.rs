use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::StudioError;
use crate::gemini::ModelClient;
use crate::models::GenerationOptions;

pub const SUGGESTION_COUNT: usize = 3;

/// Builds prompt suggestions for a set of options, falling back to fixed
/// templates whenever the model cannot deliver.
#[derive(Clone)]
pub struct PromptComposer {
    client: Arc<dyn ModelClient>,
}

impl PromptComposer {
    pub fn new(client: Arc<dyn ModelClient>) -> Self { Self { client } }

    /// Always yields at least [`SUGGESTION_COUNT`] prompts.
    pub async fn suggest(&self, options: &GenerationOptions, style_description: Option<&str>) -> Vec<String> {
        let instruction = build_instruction(options, style_description);
        let outcome = match self.client.suggest_prompts(&instruction).await {
            Ok(raw) => parse_suggestions(&raw),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(suggestions) => {
                info!("💡 Received {} prompt suggestions", suggestions.len());
                suggestions
            }
            Err(e) => {
                warn!("⚠️ Prompt suggestion failed, using templates: {}", e);
                fallback_suggestions(options)
            }
        }
    }
}

pub fn build_instruction(options: &GenerationOptions, style_description: Option<&str>) -> String {
    let aesthetic = match style_description.map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) => format!("Crucially, the aesthetic must be heavily inspired by this style description: \"{style}\""),
        None => "The aesthetic should be clean, modern, and suitable for high-end e-commerce.".to_string(),
    };
    format!(
        "You are an expert art director specializing in product photography. Generate {count} distinct and highly creative photo prompts for a product photoshoot. The subject of the photo will be provided separately in an image.

Each prompt must adhere strictly to the following constraints:
- Aspect Ratio: {ar}
- Lighting Style: {ls}
- Camera Perspective: {cp} shot

{aesthetic}

Focus on creating compelling scenes, backgrounds, and moods. The prompts should be detailed enough to guide an AI image generator effectively. Do not mention the subject of the image in the prompt.

Return the response as a JSON array of strings. For example: [\"prompt 1\", \"prompt 2\", \"prompt 3\"]",
        count = SUGGESTION_COUNT,
        ar = options.aspect_ratio,
        ls = options.lighting_style,
        cp = options.camera_perspective,
    )
}

/// Accepts only a JSON array of non-blank strings with at least
/// [`SUGGESTION_COUNT`] entries.
pub fn parse_suggestions(raw: &str) -> Result<Vec<String>, StudioError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| StudioError::MalformedResponse(format!("suggestions are not JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(StudioError::MalformedResponse("suggestions are not an array".into()));
    };
    let suggestions = items
        .into_iter()
        .map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(s),
            other => Err(StudioError::MalformedResponse(format!("suggestion is not a non-empty string: {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if suggestions.len() < SUGGESTION_COUNT {
        return Err(StudioError::MalformedResponse(format!(
            "expected {} suggestions, got {}", SUGGESTION_COUNT, suggestions.len()
        )));
    }
    Ok(suggestions)
}

pub fn fallback_suggestions(options: &GenerationOptions) -> Vec<String> {
    let ar = options.aspect_ratio;
    let ls = options.lighting_style;
    let cp = options.camera_perspective;
    let ls_lower = ls.value().to_lowercase();
    let cp_lower = cp.value().to_lowercase();
    vec![
        format!("A professional product photograph. Aspect Ratio: {ar}. Lighting: {ls}. Camera Perspective: {cp}."),
        format!("A clean, minimalist product shot with {ls_lower} lighting, taken from a {cp_lower} angle in {ar} format."),
        format!("An eye-catching advertisement style image for a product, using a {cp_lower} perspective and {ls_lower} lighting. The aspect ratio is {ar}."),
    ]
}
