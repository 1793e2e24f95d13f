use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::StudioError,
    models::{ImageRole, OptionCatalog, OptionsUpdate, PromptUpdate, SessionView, UploadedImage},
    studio::{Studio, StudioSession},
};

pub const DOWNLOAD_BASENAME: &str = "ai-photo-studio-result";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HashMap<Uuid, Arc<StudioSession>>>>,
    pub studio: Arc<Studio>,
}

impl AppState {
    pub fn new(studio: Arc<Studio>) -> Self {
        Self { store: Arc::default(), studio }
    }

    fn session(&self, id: Uuid) -> Result<Arc<StudioSession>, StudioError> {
        self.store.read().get(&id).cloned().ok_or(StudioError::SessionNotFound)
    }

    /// Drops sessions untouched for longer than `ttl`. Sessions with a
    /// generation or suggestion round in flight are kept.
    pub fn evict_idle(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - ttl;
        let mut store = self.store.write();
        let before = store.len();
        store.retain(|_, session| !session.idle_since(cutoff));
        before - store.len()
    }
}

/// Periodically evicts idle sessions. Returns `None` when `ttl_secs` is zero.
pub fn spawn_session_sweeper(state: AppState, ttl_secs: u64) -> Option<JoinHandle<()>> {
    if ttl_secs == 0 {
        return None;
    }
    // capped at ten years so the chrono conversion cannot overflow
    let ttl = chrono::Duration::seconds(ttl_secs.min(10 * 365 * 24 * 3600) as i64);
    let period = Duration::from_secs((ttl_secs / 4).clamp(1, 60));
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(ttl, Utc::now());
            if evicted > 0 {
                tracing::info!(evicted, remaining = state.store.read().len(), "🧹 Evicted idle studio sessions");
            }
        }
    }))
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/options", get(list_options))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/images/:role", put(upload_image).delete(remove_image))
        .route("/api/sessions/:id/options", put(update_options))
        .route("/api/sessions/:id/prompt", put(set_prompt))
        .route("/api/sessions/:id/suggestions/:index", post(select_suggestion))
        .route("/api/sessions/:id/generate", post(generate_image))
        .route("/api/sessions/:id/result", get(download_result))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn list_options() -> Json<OptionCatalog> {
    Json(OptionCatalog::build())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let session = Arc::new(StudioSession::new());
    state.store.write().insert(session.id, session.clone());
    tracing::info!("🚀 Created studio session {}", session.id);

    // suggestions for the default options are derived straight away
    state.studio.spawn_refresh(session.clone());
    (StatusCode::CREATED, Json(session.view()))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, StudioError> {
    Ok(Json(state.session(id)?.view()))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, StudioError> {
    state.store.write().remove(&id).ok_or(StudioError::SessionNotFound)?;
    tracing::info!("🗑️ Dropped studio session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_image(
    Path((id, role)): Path<(Uuid, ImageRole)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionView>, StudioError> {
    let session = state.session(id)?;
    if body.is_empty() {
        return Err(StudioError::Validation(format!("The {role} image upload is empty.")));
    }
    let media_type = declared_media_type(&headers, &body)?;

    if session.set_image(UploadedImage::new(role, media_type, body)) {
        state.studio.spawn_refresh(session.clone());
    }
    Ok(Json(session.view()))
}

pub async fn remove_image(
    Path((id, role)): Path<(Uuid, ImageRole)>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StudioError> {
    let session = state.session(id)?;
    if session.clear_image(role) {
        state.studio.spawn_refresh(session.clone());
    }
    Ok(Json(session.view()))
}

pub async fn update_options(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<OptionsUpdate>,
) -> Result<Json<SessionView>, StudioError> {
    let session = state.session(id)?;
    if session.update_options(&body) {
        state.studio.spawn_refresh(session.clone());
    }
    Ok(Json(session.view()))
}

pub async fn set_prompt(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<PromptUpdate>,
) -> Result<Json<SessionView>, StudioError> {
    let session = state.session(id)?;
    session.set_prompt(body.prompt);
    Ok(Json(session.view()))
}

pub async fn select_suggestion(
    Path((id, index)): Path<(Uuid, usize)>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StudioError> {
    let session = state.session(id)?;
    session.select_suggestion(index)?;
    Ok(Json(session.view()))
}

#[axum::debug_handler]
pub async fn generate_image(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StudioError> {
    let session = state.session(id)?;
    state.studio.generate(&session).await?;
    Ok(Json(session.view()))
}

pub async fn download_result(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StudioError> {
    let image = state.session(id)?.result_image()?;
    let bytes = image
        .decode_bytes()
        .map_err(|e| StudioError::MalformedResponse(format!("generated image is not valid base64: {e}")))?;
    let disposition = format!("attachment; filename=\"{}.{}\"", DOWNLOAD_BASENAME, image.file_extension());
    Ok((
        [(header::CONTENT_TYPE, image.mime_type.clone()), (header::CONTENT_DISPOSITION, disposition)],
        bytes,
    ))
}

/// Media type from `Content-Type`, or sniffed from the payload when the client
/// did not send one.
fn declared_media_type(headers: &HeaderMap, body: &[u8]) -> Result<String, StudioError> {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty() && v != "application/octet-stream");

    let media_type = match declared {
        Some(media_type) => media_type,
        None => image::guess_format(body)
            .map(|format| format.to_mime_type().to_string())
            .map_err(|_| StudioError::Validation("Could not determine the uploaded file's image type.".into()))?,
    };
    if !media_type.starts_with("image/") {
        return Err(StudioError::Validation(format!("Unsupported upload type {media_type}; please upload an image.")));
    }
    Ok(media_type)
}
