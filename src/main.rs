mod config;
mod error;
mod gemini;
mod imaging;
mod models;
mod prompts;
mod routes;
mod studio;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Settings;
use crate::gemini::GeminiClient;
use crate::routes::{router, spawn_session_sweeper, AppState};
use crate::studio::Studio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Arc::new(Settings::from_env());
    match &settings.api_key {
        Some(key) => tracing::info!("Using API key: {}...", key.chars().take(4).collect::<String>()),
        None => tracing::warn!("GEMINI_API_KEY is not set; model calls will fail until it is configured"),
    }

    let studio = Arc::new(Studio::new(Arc::new(GeminiClient::new(settings.clone()))));
    let state = AppState::new(studio);
    spawn_session_sweeper(state.clone(), settings.session_ttl_secs);
    let app = router(state, settings.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
