use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StudioError;
use crate::gemini::ModelClient;
use crate::imaging;
use crate::models::{
    AspectRatio, GenerationOptions, GenerationResult, ImageRole, ImageSummary, InlineImage, OptionsUpdate,
    ResultPane, SessionView, UploadedImage,
};
use crate::prompts::PromptComposer;

pub const STYLE_ANALYSIS_NOTICE: &str = "Could not analyze style image. Using fallback prompts.";
const GENERIC_FAILURE: &str = "An unexpected error occurred.";
pub const CANCELLED_MESSAGE: &str = "Generation was interrupted before it finished. Please try again.";

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub product_image: Option<UploadedImage>,
    pub style_image: Option<UploadedImage>,
    pub options: GenerationOptions,
    pub style_description: String,
    pub suggestions: Vec<String>,
    pub active_prompt: String,
    pub result: Option<GenerationResult>,
    pub is_generating: bool,
    pub is_suggesting: bool,
    pub notice: Option<String>,
}

impl SessionState {
    pub fn pane(&self) -> ResultPane {
        if self.is_generating {
            return ResultPane::Loading;
        }
        match &self.result {
            None => ResultPane::Empty,
            Some(GenerationResult::Failed { message }) => ResultPane::Error { message: message.clone() },
            Some(GenerationResult::Succeeded(image)) => {
                ResultPane::Image { data_uri: image.data_uri(), mime_type: image.mime_type.clone() }
            }
        }
    }

    pub fn can_generate(&self) -> bool {
        self.product_image.is_some() && !self.is_generating && !self.is_suggesting
    }
}

/// Snapshot taken when a describe/suggest round starts. Its token decides
/// whether the round's results may still be written back.
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    pub token: u64,
    pub options: GenerationOptions,
    pub style_image: Option<UploadedImage>,
}

#[derive(Debug, Clone)]
struct GenerationJob {
    product: UploadedImage,
    style: Option<UploadedImage>,
    prompt: String,
    aspect_ratio: AspectRatio,
}

pub struct StudioSession {
    pub id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: RwLock<DateTime<Utc>>,
    state: RwLock<SessionState>,
    token: AtomicU64,
}

impl Default for StudioSession {
    fn default() -> Self { Self::new() }
}

impl StudioSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: RwLock::new(now),
            state: RwLock::new(SessionState::default()),
            token: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> SessionState { self.state.read().clone() }

    pub fn current_token(&self) -> u64 { self.token.load(Ordering::SeqCst) }

    fn touch(&self) { *self.updated_at.write() = Utc::now(); }

    pub fn view(&self) -> SessionView {
        let state = self.state.read();
        SessionView {
            id: self.id,
            options: state.options,
            product_image: state.product_image.as_ref().map(ImageSummary::from),
            style_image: state.style_image.as_ref().map(ImageSummary::from),
            style_description: state.style_description.clone(),
            suggestions: state.suggestions.clone(),
            active_prompt: state.active_prompt.clone(),
            is_generating: state.is_generating,
            is_suggesting: state.is_suggesting,
            can_generate: state.can_generate(),
            notice: state.notice.clone(),
            result: state.pane(),
            created_at: self.created_at,
            updated_at: *self.updated_at.read(),
        }
    }

    /// Store an upload. Returns true when the suggestions must be re-derived.
    pub fn set_image(&self, image: UploadedImage) -> bool {
        let role = image.role;
        info!(session = %self.id, "📷 {} image set ({}, {} bytes)", role, image.media_type, image.bytes.len());
        {
            let mut state = self.state.write();
            match role {
                ImageRole::Product => state.product_image = Some(image),
                ImageRole::Style => state.style_image = Some(image),
            }
        }
        self.touch();
        role == ImageRole::Style
    }

    /// Remove an upload. Returns true when the suggestions must be re-derived.
    pub fn clear_image(&self, role: ImageRole) -> bool {
        let removed = {
            let mut state = self.state.write();
            match role {
                ImageRole::Product => state.product_image.take(),
                ImageRole::Style => state.style_image.take(),
            }
        };
        self.touch();
        info!(session = %self.id, "🗑️ {} image cleared", role);
        role == ImageRole::Style && removed.is_some()
    }

    /// Apply an options update. Returns true if any value changed.
    pub fn update_options(&self, update: &OptionsUpdate) -> bool {
        let changed = {
            let mut state = self.state.write();
            let next = state.options.apply(update);
            let changed = next != state.options;
            state.options = next;
            changed
        };
        if changed {
            self.touch();
        }
        changed
    }

    pub fn set_prompt(&self, prompt: String) {
        self.state.write().active_prompt = prompt;
        self.touch();
    }

    pub fn select_suggestion(&self, index: usize) -> Result<String, StudioError> {
        let prompt = {
            let mut state = self.state.write();
            let chosen = state.suggestions.get(index).cloned().ok_or(StudioError::InvalidSuggestion(index))?;
            state.active_prompt = chosen.clone();
            chosen
        };
        self.touch();
        Ok(prompt)
    }

    pub fn result_image(&self) -> Result<InlineImage, StudioError> {
        match &self.state.read().result {
            Some(GenerationResult::Succeeded(image)) => Ok(image.clone()),
            _ => Err(StudioError::NoResult),
        }
    }

    /// Start a new describe/suggest round, superseding any round in flight.
    pub fn begin_refresh(&self) -> RefreshTicket {
        let mut state = self.state.write();
        let token = self.token.fetch_add(1, Ordering::SeqCst) + 1;
        state.is_suggesting = true;
        state.suggestions.clear();
        state.notice = None;
        RefreshTicket { token, options: state.options, style_image: state.style_image.clone() }
    }

    /// Write back a finished round. Returns false, leaving state untouched,
    /// when a newer round has started since `token` was issued.
    fn apply_refresh(&self, token: u64, style_description: String, suggestions: Vec<String>, notice: Option<String>) -> bool {
        {
            let mut state = self.state.write();
            if self.token.load(Ordering::SeqCst) != token {
                return false;
            }
            if let Some(first) = suggestions.first() {
                state.active_prompt = first.clone();
            }
            state.style_description = style_description;
            state.suggestions = suggestions;
            state.notice = notice;
            state.is_suggesting = false;
        }
        self.touch();
        true
    }

    fn begin_generation(&self) -> Result<GenerationJob, StudioError> {
        let mut state = self.state.write();
        let product = state
            .product_image
            .clone()
            .ok_or_else(|| StudioError::Validation("Please upload a product image first.".into()))?;
        if state.active_prompt.trim().is_empty() {
            return Err(StudioError::Validation("Please select or write a prompt.".into()));
        }
        if state.is_generating || state.is_suggesting {
            return Err(StudioError::Busy);
        }
        state.is_generating = true;
        state.result = None;
        Ok(GenerationJob {
            product,
            style: state.style_image.clone(),
            prompt: state.active_prompt.clone(),
            aspect_ratio: state.options.aspect_ratio,
        })
    }

    fn finish_generation(&self, outcome: &Result<InlineImage, StudioError>) {
        let result = match outcome {
            Ok(image) => GenerationResult::Succeeded(image.clone()),
            Err(e) => {
                let message = e.to_string();
                let message = if message.trim().is_empty() { GENERIC_FAILURE.to_string() } else { message };
                GenerationResult::Failed { message }
            }
        };
        self.settle_generation(result);
    }

    fn settle_generation(&self, result: GenerationResult) {
        {
            let mut state = self.state.write();
            state.is_generating = false;
            state.result = Some(result);
        }
        self.touch();
    }

    pub fn last_active(&self) -> DateTime<Utc> { *self.updated_at.read() }

    /// A session is evictable once nothing is in flight and it has not been
    /// touched since `cutoff`.
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        let state = self.state.read();
        !state.is_generating && !state.is_suggesting && self.last_active() < cutoff
    }
}

/// Marks an in-flight generation. If the attempt's future is dropped before
/// it completes, the session is released with a failed result.
struct GenerationGuard<'a> {
    session: &'a StudioSession,
    settled: bool,
}

impl<'a> GenerationGuard<'a> {
    fn finish(mut self, outcome: &Result<InlineImage, StudioError>) {
        self.session.finish_generation(outcome);
        self.settled = true;
    }
}

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(session = %self.session.id, "⚠️ Generation dropped before completion");
            self.session.settle_generation(GenerationResult::Failed { message: CANCELLED_MESSAGE.to_string() });
        }
    }
}

/// Drives sessions through the describe → suggest → generate workflow.
pub struct Studio {
    client: Arc<dyn ModelClient>,
    composer: PromptComposer,
}

impl Studio {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        let composer = PromptComposer::new(client.clone());
        Self { client, composer }
    }

    pub async fn refresh_suggestions(&self, session: &StudioSession) -> bool {
        let ticket = session.begin_refresh();
        self.run_refresh(session, ticket).await
    }

    /// Start a round now and finish it on a background task.
    pub fn spawn_refresh(self: &Arc<Self>, session: Arc<StudioSession>) -> u64 {
        let ticket = session.begin_refresh();
        let token = ticket.token;
        let studio = Arc::clone(self);
        tokio::spawn(async move {
            studio.run_refresh(&session, ticket).await;
        });
        token
    }

    /// Returns whether the round's results were applied.
    pub async fn run_refresh(&self, session: &StudioSession, ticket: RefreshTicket) -> bool {
        let (style_description, notice) = match &ticket.style_image {
            Some(style) => match self.describe(style).await {
                Ok(text) => (text, None),
                Err(e) => {
                    warn!(session = %session.id, "⚠️ Failed to describe style image: {}", e);
                    (String::new(), Some(STYLE_ANALYSIS_NOTICE.to_string()))
                }
            },
            None => (String::new(), None),
        };

        let style = Some(style_description.as_str()).filter(|s| !s.trim().is_empty());
        let suggestions = self.composer.suggest(&ticket.options, style).await;

        let applied = session.apply_refresh(ticket.token, style_description, suggestions, notice);
        if applied {
            info!(session = %session.id, token = ticket.token, "✅ Prompt suggestions updated");
        } else {
            info!(session = %session.id, token = ticket.token, "Discarding stale prompt suggestions");
        }
        applied
    }

    async fn describe(&self, style: &UploadedImage) -> Result<String, StudioError> {
        let inline = imaging::transcode(style)?;
        self.client.describe_style(&inline).await
    }

    /// Run one generation attempt. The outcome is recorded on the session and
    /// also returned.
    pub async fn generate(&self, session: &StudioSession) -> Result<InlineImage, StudioError> {
        let job = session.begin_generation()?;
        let guard = GenerationGuard { session, settled: false };
        info!(
            session = %session.id,
            "🎯 Generating {} image with prompt: {}",
            job.aspect_ratio,
            job.prompt.chars().take(100).collect::<String>()
        );

        let outcome = self.render(job).await;
        match &outcome {
            Ok(image) => info!(session = %session.id, "✅ Generated {} image", image.mime_type),
            Err(e) => error!(session = %session.id, "❌ Image generation failed: {}", e),
        }
        guard.finish(&outcome);
        outcome
    }

    async fn render(&self, job: GenerationJob) -> Result<InlineImage, StudioError> {
        let product = imaging::normalize_in_background(job.product.bytes.clone(), job.aspect_ratio).await?;
        let style = job.style.as_ref().map(imaging::transcode).transpose()?;
        self.client.generate_image(&product, &job.prompt, style.as_ref()).await
    }
}
