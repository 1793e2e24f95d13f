use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StudioError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingCredential,
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Could not prepare drawing surface: {0}")]
    RenderSurface(String),
    #[error("Could not encode image: {0}")]
    Encode(String),
    #[error("Malformed response from model: {0}")]
    MalformedResponse(String),
    #[error("No image was generated. The model may have refused the request.")]
    NoImageProduced,
    #[error("{0}")]
    Validation(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Model API error (status {status}): {message}")]
    Remote { status: u16, message: String },
    #[error("A generation or prompt suggestion is already in progress")]
    Busy,
    #[error("Session not found")]
    SessionNotFound,
    #[error("No generated image is available")]
    NoResult,
    #[error("No prompt suggestion at index {0}")]
    InvalidSuggestion(usize),
}

impl StudioError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Decode(_) => "decode",
            Self::RenderSurface(_) => "render_surface",
            Self::Encode(_) => "encode",
            Self::MalformedResponse(_) => "malformed_response",
            Self::NoImageProduced => "no_image_produced",
            Self::Validation(_) => "validation",
            Self::Http(_) => "http",
            Self::Remote { .. } => "remote",
            Self::Busy => "busy",
            Self::SessionNotFound => "session_not_found",
            Self::NoResult => "no_result",
            Self::InvalidSuggestion(_) => "invalid_suggestion",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential => StatusCode::SERVICE_UNAVAILABLE,
            Self::Decode(_) | Self::RenderSurface(_) | Self::Encode(_) | Self::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::MalformedResponse(_) | Self::NoImageProduced | Self::Http(_) | Self::Remote { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Busy => StatusCode::CONFLICT,
            Self::SessionNotFound | Self::NoResult => StatusCode::NOT_FOUND,
            Self::InvalidSuggestion(_) => StatusCode::BAD_REQUEST,
        }
    }
}

// The request URL is dropped so nothing about the endpoint reaches callers.
impl From<reqwest::Error> for StudioError {
    fn from(e: reqwest::Error) -> Self { Self::Http(e.without_url().to_string()) }
}

impl IntoResponse for StudioError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string(), "kind": self.kind() }));
        (self.status(), body).into_response()
    }
}
