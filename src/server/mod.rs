/// HTTP surface: health, full parse and detection-only endpoints.
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::perception::ScreenParser;

mod handlers;
pub mod types;
pub mod upload;

pub use handlers::*;
pub use types::*;

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub parser: Arc<ScreenParser>,
    /// Uploads are staged here and annotated images written next to them.
    /// Staged uploads are removed per request; annotated images are kept,
    /// and pruning them is left to whoever operates the directory.
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl ApiState {
    pub fn new(parser: Arc<ScreenParser>, output_dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            parser,
            output_dir,
            max_upload_bytes,
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/parse", post(parse_image))
        .route("/detect", post(detect_elements))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // without a signal handler the server runs until killed
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
