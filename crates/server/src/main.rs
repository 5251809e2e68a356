mod cli;
mod config;
mod http;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio::sync::watch;

use dragnet_core::wire::JobConfigData;
use dragnet_server_engine::{CheckpointStore, SearchEngine};

use crate::cli::Cli;
use crate::config::ServerConfig;
use crate::http::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config)?;
    dragnet_core::logging::init(config.logger.file_path.as_deref())?;

    let checkpoint = CheckpointStore::new(config.search.file_path.clone());
    let engine = Arc::new(SearchEngine::new(
        config.search.job.timeout_seconds,
        checkpoint,
    )?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let sweeper = engine.spawn_sweeper(stop_rx);

    let state = AppState {
        engine: engine.clone(),
        api_key: config.api_key.clone(),
        job_config: JobConfigData {
            target_duration_seconds: config.search.job.target_duration_seconds,
            update_interval_seconds: config.search.job.update_interval_seconds,
            timeout_seconds: config.search.job.timeout_seconds,
        },
    };
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    tracing::info!("shutting down");
    let _ = stop_tx.send(true);
    let _ = sweeper.await;

    if let Err(err) = engine.persist().await {
        tracing::error!("final checkpoint write failed: {err:#}");
    } else {
        tracing::info!("final checkpoint written");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
