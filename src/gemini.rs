use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::StudioError;
use crate::models::InlineImage;

pub const STYLE_DESCRIPTION_INSTRUCTION: &str = "Describe this image's visual style in detail. Focus on the lighting, color palette, composition, mood, and overall aesthetic. Be descriptive and concise, as if writing an art director's brief. Do not mention the subject of the image, only the style.";

/// The three exchanges the studio needs from a generative model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Characterize the visual style of `image`, excluding its subject.
    async fn describe_style(&self, image: &InlineImage) -> Result<String, StudioError>;

    /// Send `instruction` asking for a JSON array of strings and return the raw
    /// JSON text. Shape validation is left to the caller.
    async fn suggest_prompts(&self, instruction: &str) -> Result<String, StudioError>;

    /// Render a new product photo. Parts are sent as product, style, prompt.
    async fn generate_image(
        &self,
        product: &InlineImage,
        prompt: &str,
        style: Option<&InlineImage>,
    ) -> Result<InlineImage, StudioError>;
}

const API_KEY_HEADER: &str = "x-goog-api-key";

fn is_base64_blob(s: &str) -> bool {
    s.len() > 100 && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Compact JSON for the logs, with inline image payloads cut down to a prefix.
fn loggable(value: &Value) -> String {
    fn shorten(value: &Value) -> Value {
        match value {
            Value::String(s) if is_base64_blob(s) => {
                Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50))
            }
            Value::Array(items) => Value::Array(items.iter().map(shorten).collect()),
            Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), shorten(v))).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&shorten(value)).unwrap_or_default()
}

pub struct GeminiClient {
    client: Client,
    settings: Arc<Settings>,
}

impl GeminiClient {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { client: Client::new(), settings }
    }

    fn api_key(&self) -> Result<&str, StudioError> {
        self.settings.api_key.as_deref().filter(|k| !k.is_empty()).ok_or(StudioError::MissingCredential)
    }

    async fn generate_content(&self, model: &str, body: Value) -> Result<GeminiResponse, StudioError> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}:generateContent", self.settings.api_base, model);

        info!("🔗 Making request to: {}", url);
        info!("📤 Request body: {}", loggable(&body));

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(StudioError::Remote { status: status.as_u16(), message: remote_error_message(&response_text) });
        }

        let raw: Value = serde_json::from_str(&response_text)
            .map_err(|e| StudioError::MalformedResponse(format!("response is not JSON: {e}")))?;
        info!("📥 Raw Gemini API response: {}", loggable(&raw));

        serde_json::from_value(raw).map_err(|e| StudioError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn describe_style(&self, image: &InlineImage) -> Result<String, StudioError> {
        let body = json!({
            "contents": [{
                "parts": [
                    {"text": STYLE_DESCRIPTION_INSTRUCTION},
                    {"inlineData": image}
                ]
            }]
        });
        let parsed = self.generate_content(&self.settings.text_model, body).await?;
        let text = parsed.text().ok_or_else(|| StudioError::MalformedResponse("no text in style description".into()))?;
        info!("🎨 Style description received ({} chars)", text.len());
        Ok(text)
    }

    async fn suggest_prompts(&self, instruction: &str) -> Result<String, StudioError> {
        let body = json!({
            "contents": [{
                "parts": [{"text": instruction}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "STRING",
                        "description": "A creative and detailed prompt for image generation."
                    }
                }
            }
        });
        let parsed = self.generate_content(&self.settings.text_model, body).await?;
        parsed.text().ok_or_else(|| StudioError::MalformedResponse("no text in prompt suggestions".into()))
    }

    async fn generate_image(
        &self,
        product: &InlineImage,
        prompt: &str,
        style: Option<&InlineImage>,
    ) -> Result<InlineImage, StudioError> {
        let mut parts = vec![json!({"inlineData": product})];
        if let Some(style) = style {
            parts.push(json!({"inlineData": style}));
        }
        // prompt always goes last
        parts.push(json!({"text": prompt}));

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["IMAGE"]
            }
        });

        info!("Generating image with Gemini API...");
        let parsed = self.generate_content(&self.settings.image_model, body).await?;
        match extract_first_image(&parsed) {
            Some(image) => {
                info!("✅ Received {} image ({} base64 chars)", image.mime_type, image.data.len());
                Ok(image)
            }
            None => {
                warn!("⚠️ No image data found in API response");
                Err(StudioError::NoImageProduced)
            }
        }
    }
}

fn remote_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineImage,
    },
    Text { text: String },
    Other(Value),
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let texts: Vec<&str> = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if texts.is_empty() { None } else { Some(texts.concat()) }
    }
}

fn extract_first_image(resp: &GeminiResponse) -> Option<InlineImage> {
    resp.candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .find_map(|p| match p {
            Part::Inline { inline_data } if !inline_data.data.is_empty() => Some(inline_data.clone()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        let settings = Settings::default().with_api_key("test-key").with_api_base(server.uri());
        GeminiClient::new(Arc::new(settings))
    }

    fn product() -> InlineImage {
        InlineImage { mime_type: "image/jpeg".into(), data: "UFJPRFVDVA==".into() }
    }

    fn style() -> InlineImage {
        InlineImage { mime_type: "image/png".into(), data: "U1RZTEU=".into() }
    }

    fn body_of(request: &Request) -> Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let server = MockServer::start().await;
        let client = GeminiClient::new(Arc::new(Settings::default().with_api_base(server.uri())));

        assert!(matches!(client.describe_style(&style()).await, Err(StudioError::MissingCredential)));
        assert!(matches!(client.suggest_prompts("x").await, Err(StudioError::MissingCredential)));
        assert!(matches!(
            client.generate_image(&product(), "p", None).await,
            Err(StudioError::MissingCredential)
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn generate_image_orders_parts_and_returns_first_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash-image:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            {"text": "Here is your image"},
                            {"inlineData": {"mimeType": "image/png", "data": "aW1hZ2U="}},
                            {"inlineData": {"mimeType": "image/png", "data": "c2Vjb25k"}}
                        ]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = client_for(&server)
            .generate_image(&product(), "on a marble table", Some(&style()))
            .await
            .unwrap();
        assert_eq!(image.data_uri(), "data:image/png;base64,aW1hZ2U=");

        let requests = server.received_requests().await.unwrap();
        let body = body_of(&requests[0]);
        assert_eq!(
            body["contents"][0]["parts"],
            json!([
                {"inlineData": {"mimeType": "image/jpeg", "data": "UFJPRFVDVA=="}},
                {"inlineData": {"mimeType": "image/png", "data": "U1RZTEU="}},
                {"text": "on a marble table"}
            ])
        );
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["IMAGE"]));
    }

    #[tokio::test]
    async fn generate_image_without_image_part_is_no_image_produced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "I can't help with that."}]}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate_image(&product(), "p", None).await.unwrap_err();
        assert!(matches!(err, StudioError::NoImageProduced));
        let body = body_of(&server.received_requests().await.unwrap()[0]);
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn suggest_prompts_requests_string_array_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "[\"a\", \"b\", \"c\"]"}]}}]
            })))
            .mount(&server)
            .await;

        let raw = client_for(&server).suggest_prompts("give me prompts").await.unwrap();
        assert_eq!(raw, "[\"a\", \"b\", \"c\"]");

        let body = body_of(&server.received_requests().await.unwrap()[0]);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert_eq!(body["generationConfig"]["responseSchema"]["items"]["type"], "STRING");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "give me prompts");
    }

    #[tokio::test]
    async fn describe_style_sends_instruction_then_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "Moody low-key lighting, teal palette."}]}}]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).describe_style(&style()).await.unwrap();
        assert_eq!(text, "Moody low-key lighting, teal palette.");

        let body = body_of(&server.received_requests().await.unwrap()[0]);
        assert_eq!(body["contents"][0]["parts"][0]["text"], STYLE_DESCRIPTION_INSTRUCTION);
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
    }

    #[tokio::test]
    async fn non_success_status_surfaces_remote_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate_image(&product(), "p", None).await.unwrap_err();
        match err {
            StudioError::Remote { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).suggest_prompts("x").await.unwrap_err();
        assert!(matches!(err, StudioError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn transport_failure_never_exposes_the_key() {
        // nothing listens on port 1, so the request fails before any response
        let settings = Settings::default().with_api_key("SECRET-KEY-123").with_api_base("http://127.0.0.1:1");
        let client = GeminiClient::new(Arc::new(settings));

        let err = client.suggest_prompts("x").await.unwrap_err();
        assert!(matches!(err, StudioError::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{err}");
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn key_travels_in_header_not_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "[]"}]}}]
            })))
            .mount(&server)
            .await;

        client_for(&server).suggest_prompts("x").await.unwrap();
        let request = &server.received_requests().await.unwrap()[0];
        assert_eq!(request.url.query(), None);
        assert_eq!(request.headers.get("x-goog-api-key").unwrap(), "test-key");
    }

    #[test]
    fn plain_text_is_not_truncated() {
        let prompt = "a long prompt with spaces ".repeat(10);
        let logged = loggable(&json!({"text": prompt}));
        assert!(logged.contains(prompt.trim_end()));
    }

    #[test]
    fn truncates_long_base64_for_logging() {
        let long = "A".repeat(500);
        let logged = loggable(&json!({"parts": [{"inlineData": {"mimeType": "image/png", "data": long}}]}));
        assert!(logged.contains("[truncated 450 chars]"));
        assert!(logged.len() < 200);
    }
}
