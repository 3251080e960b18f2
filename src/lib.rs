pub mod api;
pub mod config;
pub mod downloader;
pub mod jobs;
pub mod logging;
pub mod ytdlp;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::AppState;
use crate::config::ServiceConfig;
use crate::jobs::JobManager;
use crate::ytdlp::YtDlpEngine;

/// Build the engine and job manager, then serve the HTTP API until shutdown
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let settings = config.manager_settings();
    tokio::fs::create_dir_all(&settings.work_root)
        .await
        .with_context(|| format!("cannot create work root {}", settings.work_root.display()))?;

    let engine = Arc::new(YtDlpEngine::new(
        config.ytdlp_path.clone(),
        config.engine.clone(),
    ));
    let manager = Arc::new(JobManager::new(engine, settings));

    let swept = manager.sweep_stale_work_dirs().await;
    if swept > 0 {
        info!(swept, "removed work dirs from a previous run");
    }

    let app = api::router(AppState { manager });
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    info!("ytdl-service listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
