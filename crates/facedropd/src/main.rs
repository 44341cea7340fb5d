use anyhow::{Context, Result};
use facedrop_core::ModelBundle;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod routes;
mod state;
mod storage;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facedropd starting");

    let config = Config::from_env();
    tracing::info!(
        listen = %config.listen_addr(),
        model_dir = %config.model_dir.display(),
        upload_dir = %config.upload_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        retain_uploads = config.retain_uploads,
        "configuration loaded"
    );

    let state = AppState::new(config.clone());
    if !state.sink.dir().is_dir() {
        tracing::warn!(
            upload_dir = %state.sink.dir().display(),
            "upload directory does not exist; uploads will fail until it is created"
        );
    }

    let model_dir = config.model_dir.clone();
    let started = std::time::Instant::now();
    let bundle = tokio::task::spawn_blocking(move || ModelBundle::load(&model_dir))
        .await
        .context("model loading task panicked")?
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "models loaded"
    );

    let engine = engine::spawn_engine(bundle, config.engine_queue_depth)
        .context("failed to start analysis engine")?;
    state.mark_ready(engine);

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
    tracing::info!(addr = %config.listen_addr(), "facedropd ready");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    tracing::info!("facedropd shutting down");
    Ok(())
}
