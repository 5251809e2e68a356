//! Search subprocess supervision.
//!
//! One invocation per job: `<binary> <start> <end>`, stdout streamed
//! line-by-line as JSON results, stderr collected for error reporting. The
//! child is heartbeated to the server while it runs and killed on every
//! non-normal exit path.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use dragnet_core::wire::JobData;

use crate::backend::ApiClient;

#[derive(Debug)]
pub(crate) struct SearchOutcome {
    pub(crate) duration: Duration,
    pub(crate) results: Vec<serde_json::Value>,
}

pub(crate) async fn run_search(
    binary: &Path,
    job: &JobData,
    api: &mut ApiClient,
    update_interval: Duration,
    stop: &mut watch::Receiver<bool>,
) -> anyhow::Result<SearchOutcome> {
    let started = Instant::now();

    let mut child = Command::new(binary)
        .arg(job.start_index.to_string())
        .arg(job.end_index.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawn search binary {}", binary.display()))?;

    let stdout = child.stdout.take().context("search binary stdout missing")?;
    let stderr = child.stderr.take().context("search binary stderr missing")?;

    // Drain stderr concurrently so a chatty binary cannot block on a full
    // pipe while we are still reading stdout.
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
        buf
    });

    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + update_interval,
        update_interval,
    );
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut lines = BufReader::new(stdout).lines();
    let mut results = Vec::new();

    // Consume stdout until EOF. Each non-empty line is one JSON result.
    let read_result: anyhow::Result<()> = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<serde_json::Value>(line) {
                            Ok(value) => results.push(value),
                            Err(err) => {
                                break Err(anyhow::anyhow!("unparsable search output line: {err}"));
                            }
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(anyhow::anyhow!("read search output: {err}")),
                }
            }
            _ = heartbeat.tick() => {
                if let Err(err) = api.update_job(job).await {
                    break Err(anyhow::Error::new(err).context("job heartbeat failed"));
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break Err(anyhow::anyhow!("stop requested"));
                }
            }
        }
    };

    if let Err(err) = read_result {
        kill_child(&mut child).await;
        // Abort rather than await: an orphaned grandchild of the binary can
        // keep the stderr pipe open indefinitely.
        stderr_task.abort();
        return Err(err);
    }

    // stdout is closed; keep heartbeating until the child actually exits.
    enum Exit {
        Status(std::io::Result<std::process::ExitStatus>),
        Failed(anyhow::Error),
    }

    let exit = loop {
        tokio::select! {
            status = child.wait() => break Exit::Status(status),
            _ = heartbeat.tick() => {
                if let Err(err) = api.update_job(job).await {
                    break Exit::Failed(anyhow::Error::new(err).context("job heartbeat failed"));
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break Exit::Failed(anyhow::anyhow!("stop requested"));
                }
            }
        }
    };

    let status = match exit {
        Exit::Status(status) => status.context("wait for search binary")?,
        Exit::Failed(err) => {
            kill_child(&mut child).await;
            stderr_task.abort();
            return Err(err);
        }
    };

    let duration = started.elapsed();

    if !status.success() {
        // Bounded wait: a grandchild of the binary may still hold the
        // stderr pipe open after the binary itself exited.
        let stderr_output =
            match tokio::time::timeout(Duration::from_secs(5), stderr_task).await {
                Ok(Ok(buf)) => buf,
                _ => String::new(),
            };
        anyhow::bail!(
            "search binary exited with {status}: {}",
            stderr_output.trim()
        );
    }

    stderr_task.abort();
    Ok(SearchOutcome { duration, results })
}

async fn kill_child(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}
