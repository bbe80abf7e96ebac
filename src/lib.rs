pub mod config;
pub mod errors;
pub mod perception;
pub mod server;

use std::sync::Arc;

use crate::config::{ModelConfig, ServerConfig};
use crate::errors::{ParserError, ParserResult};
use crate::perception::ScreenParser;
use crate::server::{start_server, ApiState};

/// Service entry point: logging, configuration, models, then the HTTP server
/// until Ctrl-C.
pub async fn run() -> ParserResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("screenparse=info,tower_http=debug")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let server_config = ServerConfig::from_env()?;

    // Fall back to defaults on error; the detector is then usually absent and
    // every request takes the contour path.
    let model_config = match config::load_model_config(&server_config.model_config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %server_config.model_config_path.display(),
                "Failed to load model config; using defaults"
            );
            ModelConfig::default()
        }
    };

    // Session creation is blocking and can take seconds.
    let parser = tokio::task::spawn_blocking(move || ScreenParser::init(model_config))
        .await
        .map_err(|e| ParserError::Config(format!("model initialisation task failed: {e}")))?;
    let parser = Arc::new(parser);

    let state = ApiState::new(
        parser.clone(),
        server_config.output_dir.clone(),
        server_config.max_upload_bytes,
    );
    let served = start_server(&server_config.bind_addr, state).await;

    parser.teardown();
    served?;
    Ok(())
}
