// Video fetch service: deduplicated yt-dlp extraction behind a small JSON API,
// with finished files kept in a bounded-retention store.

pub mod artifacts;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod logging;
pub mod service;

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use artifacts::{ArtifactStore, RetentionSweeper, SystemClock};
use config::Config;
use downloader::{ExtractionClient, YtDlpClient};
use service::DownloadService;

pub use error::ServiceError;

/// Start the store, the sweeper and the HTTP server; returns after a
/// graceful shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = ArtifactStore::open(config.store_config(), Arc::new(SystemClock))
        .context("Failed to open artifact store")?;
    store.recover().context("Failed to recover artifact store")?;

    let client = YtDlpClient::new(config.ytdlp_config());
    match client.version().await {
        Some(version) => tracing::info!(version = %version, binary = %client.config().binary, "yt-dlp available"),
        None => tracing::warn!(binary = %client.config().binary, "yt-dlp not found, extraction requests will fail"),
    }
    let client: Arc<dyn ExtractionClient> = Arc::new(client);

    let service = Arc::new(DownloadService::new(
        client,
        store.clone(),
        config.extraction_limits(),
        config.abandon_policy,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::new(store).start(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        download_dir = %config.download_dir.display(),
        max_age_secs = config.retention.max_age.as_secs(),
        sweep_interval_secs = config.retention.sweep_interval.as_secs(),
        "Server listening"
    );

    let result = axum::serve(listener, http::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Retention sweeper did not stop cleanly");
    }
    tracing::info!("Shutdown complete");
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
