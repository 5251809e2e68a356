//! One long-lived worker task.
//!
//! The worker fetches the job configuration once, then loops: request a
//! job sized by the adaptive controller, run the search binary over it,
//! post any results, finish the job and resize. A failure anywhere in the
//! cycle abandons the current job and re-enters at the job fetch; the
//! server expires the abandoned range and reissues it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::{mpsc, watch};

use dragnet_core::wire::JobConfigData;

use crate::backend::ApiClient;
use crate::controller::next_batch_size;
use crate::search::run_search;

pub(crate) enum WorkerEvent {
    Results {
        worker_id: usize,
        results: Vec<serde_json::Value>,
    },
    JobCompleted {
        worker_id: usize,
        job_id: u64,
        duration_seconds: f64,
        next_batch_size: u64,
    },
    JobFailed {
        worker_id: usize,
        message: String,
    },
}

pub(crate) struct WorkerContext {
    pub(crate) worker_id: usize,
    pub(crate) binary_path: PathBuf,
    pub(crate) api: ApiClient,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) reports: mpsc::UnboundedSender<WorkerEvent>,
}

fn stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

pub(crate) async fn run_worker(mut ctx: WorkerContext) {
    tracing::info!(worker = ctx.worker_id, "worker started");

    let Some(config) = fetch_job_configuration(&mut ctx).await else {
        return;
    };
    tracing::info!(
        worker = ctx.worker_id,
        target_duration_seconds = config.target_duration_seconds,
        update_interval_seconds = config.update_interval_seconds,
        "job configuration received"
    );

    let update_interval = Duration::from_secs(config.update_interval_seconds.max(1));
    let target_seconds = config.target_duration_seconds as f64;
    let mut batch_size = 1u64;

    while !stopped(&ctx.stop) {
        match run_one_job(&mut ctx, batch_size, target_seconds, update_interval).await {
            Ok(next) => batch_size = next,
            Err(err) => {
                if stopped(&ctx.stop) {
                    break;
                }
                let _ = ctx.reports.send(WorkerEvent::JobFailed {
                    worker_id: ctx.worker_id,
                    message: format!("{err:#}"),
                });
            }
        }
    }

    tracing::info!(worker = ctx.worker_id, "worker stopped");
}

/// Retry until the configuration is obtained or the worker is stopped.
/// Request pacing bounds the retry rate while the server is unreachable.
async fn fetch_job_configuration(ctx: &mut WorkerContext) -> Option<JobConfigData> {
    loop {
        if stopped(&ctx.stop) {
            return None;
        }
        match ctx.api.job_configuration().await {
            Ok(config) => return Some(config),
            Err(err) => {
                tracing::warn!(
                    worker = ctx.worker_id,
                    "fetching job configuration failed: {err:#}"
                );
            }
        }
    }
}

async fn run_one_job(
    ctx: &mut WorkerContext,
    batch_size: u64,
    target_seconds: f64,
    update_interval: Duration,
) -> anyhow::Result<u64> {
    let job = ctx.api.fetch_job(batch_size).await.context("fetch job")?;
    tracing::info!(
        worker = ctx.worker_id,
        job_id = job.id,
        start_index = job.start_index,
        end_index = job.end_index,
        batch_size = job.batch_size,
        "received job"
    );

    let outcome = run_search(
        &ctx.binary_path,
        &job,
        &mut ctx.api,
        update_interval,
        &mut ctx.stop,
    )
    .await?;

    if !outcome.results.is_empty() {
        let _ = ctx.reports.send(WorkerEvent::Results {
            worker_id: ctx.worker_id,
            results: outcome.results.clone(),
        });
        ctx.api
            .post_results(&outcome.results)
            .await
            .context("post results")?;
    }

    ctx.api.finish_job(&job).await.context("finish job")?;

    let duration_seconds = outcome.duration.as_secs_f64();
    let next = next_batch_size(duration_seconds, target_seconds, batch_size);
    let _ = ctx.reports.send(WorkerEvent::JobCompleted {
        worker_id: ctx.worker_id,
        job_id: job.id,
        duration_seconds,
        next_batch_size: next,
    });
    Ok(next)
}
