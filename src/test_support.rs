//! Scripted model client for orchestrator, composer and route tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StudioError;
use crate::gemini::ModelClient;
use crate::models::InlineImage;

pub const GENERATED_IMAGE_DATA: &str = "R0VORVJBVEVE";

#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub product: InlineImage,
    pub prompt: String,
    pub style: Option<InlineImage>,
}

struct Script {
    style_reply: Result<String, StudioError>,
    suggestion_reply: Option<Result<String, StudioError>>,
    image_reply: Result<InlineImage, StudioError>,
    suggestion_delays: Vec<(String, Duration)>,
    describe_calls: usize,
    suggest_calls: usize,
    instructions: Vec<String>,
    generate_calls: Vec<GenerateCall>,
    hang_generation: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            style_reply: Ok("Soft diffused window light, muted sage palette, airy minimal composition.".into()),
            suggestion_reply: None,
            image_reply: Ok(InlineImage { mime_type: "image/png".into(), data: GENERATED_IMAGE_DATA.into() }),
            suggestion_delays: Vec::new(),
            describe_calls: 0,
            suggest_calls: 0,
            instructions: Vec::new(),
            generate_calls: Vec::new(),
            hang_generation: false,
        }
    }
}

#[derive(Default)]
pub struct MockModelClient {
    script: Mutex<Script>,
}

impl MockModelClient {
    pub fn fail_style(&self, err: StudioError) { self.script.lock().style_reply = Err(err); }

    pub fn fail_suggestions(&self, err: StudioError) { self.script.lock().suggestion_reply = Some(Err(err)); }

    pub fn respond_suggestions(&self, raw: &str) { self.script.lock().suggestion_reply = Some(Ok(raw.to_string())); }

    pub fn fail_generation(&self, err: StudioError) { self.script.lock().image_reply = Err(err); }

    /// While set, image requests are recorded but never answer.
    pub fn hang_generation(&self, hang: bool) { self.script.lock().hang_generation = hang; }

    /// Delay suggestion replies whose instruction contains `needle`.
    pub fn delay_suggestions_containing(&self, needle: &str, delay: Duration) {
        self.script.lock().suggestion_delays.push((needle.to_string(), delay));
    }

    pub fn describe_calls(&self) -> usize { self.script.lock().describe_calls }

    pub fn suggest_calls(&self) -> usize { self.script.lock().suggest_calls }

    pub fn generate_calls(&self) -> Vec<GenerateCall> { self.script.lock().generate_calls.clone() }

    pub fn last_instruction(&self) -> Option<String> { self.script.lock().instructions.last().cloned() }

    pub fn network_calls(&self) -> usize {
        let script = self.script.lock();
        script.describe_calls + script.suggest_calls + script.generate_calls.len()
    }
}

/// Default suggestion reply: three prompts tagged with the instruction's
/// constraint lines so tests can tell which options produced them.
fn echo_suggestions(instruction: &str) -> String {
    let constraints: Vec<&str> = instruction
        .lines()
        .filter_map(|l| l.strip_prefix("- "))
        .collect();
    let tag = constraints.join(" | ");
    serde_json::to_string(&[
        format!("scene one [{tag}]"),
        format!("scene two [{tag}]"),
        format!("scene three [{tag}]"),
    ])
    .unwrap()
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn describe_style(&self, _image: &InlineImage) -> Result<String, StudioError> {
        let mut script = self.script.lock();
        script.describe_calls += 1;
        script.style_reply.clone()
    }

    async fn suggest_prompts(&self, instruction: &str) -> Result<String, StudioError> {
        let (reply, delay) = {
            let mut script = self.script.lock();
            script.suggest_calls += 1;
            script.instructions.push(instruction.to_string());
            let delay = script
                .suggestion_delays
                .iter()
                .find(|(needle, _)| instruction.contains(needle.as_str()))
                .map(|(_, d)| *d);
            let reply = script.suggestion_reply.clone().unwrap_or_else(|| Ok(echo_suggestions(instruction)));
            (reply, delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    async fn generate_image(
        &self,
        product: &InlineImage,
        prompt: &str,
        style: Option<&InlineImage>,
    ) -> Result<InlineImage, StudioError> {
        let (reply, hang) = {
            let mut script = self.script.lock();
            script.generate_calls.push(GenerateCall {
                product: product.clone(),
                prompt: prompt.to_string(),
                style: style.cloned(),
            });
            (script.image_reply.clone(), script.hang_generation)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        reply
    }
}
