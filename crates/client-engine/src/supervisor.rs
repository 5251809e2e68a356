//! The worker supervisor: spawns one worker per usable core, drains their
//! report channel and appends results to the local results file.

use std::time::Duration;

use anyhow::Context as _;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::api::{SupervisorConfig, SupervisorHandle};
use crate::backend::ApiClient;
use crate::worker::{WorkerContext, WorkerEvent, run_worker};

pub(crate) fn start(config: SupervisorConfig) -> SupervisorHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let join = tokio::spawn(run(config, stop_rx));
    SupervisorHandle {
        stop: stop_tx,
        join,
    }
}

fn worker_count(idle_cores: usize) -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(idle_cores)
        .max(1)
}

async fn run(config: SupervisorConfig, stop: watch::Receiver<bool>) -> anyhow::Result<()> {
    let count = worker_count(config.idle_cores);
    tracing::info!(workers = count, "starting workers");

    let mut results_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.results_path)
        .await
        .with_context(|| format!("open results file {}", config.results_path.display()))?;

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let mut workers = JoinSet::new();
    let mut stagger = stop.clone();

    for worker_id in 0..count {
        if worker_id > 0 {
            // One worker per second avoids a thundering herd on the
            // configuration route.
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = stagger.changed() => {}
            }
        }
        if *stagger.borrow() {
            break;
        }

        let api = ApiClient::new(
            config.server_url.clone(),
            config.api_key.clone(),
            config.request_delay,
            config.request_timeout,
        )?;
        let ctx = WorkerContext {
            worker_id,
            binary_path: config.binary_path.clone(),
            api,
            stop: stop.clone(),
            reports: report_tx.clone(),
        };
        workers.spawn(run_worker(ctx));
    }
    drop(report_tx);

    // The channel closes once every worker has exited.
    while let Some(event) = report_rx.recv().await {
        handle_event(event, &mut results_file).await;
    }

    while workers.join_next().await.is_some() {}
    let _ = results_file.flush().await;
    tracing::info!("all workers stopped");
    Ok(())
}

async fn handle_event(event: WorkerEvent, results_file: &mut tokio::fs::File) {
    match event {
        WorkerEvent::Results { worker_id, results } => {
            tracing::info!(
                worker = worker_id,
                count = results.len(),
                "worker found results"
            );
            for value in results {
                match serde_json::to_string(&value) {
                    Ok(mut line) => {
                        line.push('\n');
                        if let Err(err) = results_file.write_all(line.as_bytes()).await {
                            tracing::error!("writing results file failed: {err}");
                        }
                    }
                    Err(err) => tracing::error!("serializing result failed: {err}"),
                }
            }
        }
        WorkerEvent::JobCompleted {
            worker_id,
            job_id,
            duration_seconds,
            next_batch_size,
        } => {
            tracing::info!(
                worker = worker_id,
                job_id,
                duration_seconds,
                next_batch_size,
                "job completed"
            );
        }
        WorkerEvent::JobFailed { worker_id, message } => {
            tracing::warn!(worker = worker_id, "job failed: {message}");
        }
    }
}
