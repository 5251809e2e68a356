//! Public API types for the `dragnet` client engine.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

/// Configuration for the worker supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Coordinator base URL (e.g. `http://127.0.0.1:5000/`).
    pub server_url: Url,

    /// Bearer token sent on every request.
    pub api_key: String,

    /// Minimum spacing between any two requests of one worker.
    pub request_delay: Duration,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Path of the search binary invoked as `<binary> <start> <end>`.
    pub binary_path: PathBuf,

    /// CPU cores to leave idle; the worker count is the core count minus
    /// this, floored at one worker.
    pub idle_cores: usize,

    /// Local results file; every accepted result is appended as one JSON
    /// line. This sink is at-least-once, like the server's.
    pub results_path: PathBuf,
}

/// Handle to a running supervisor.
pub struct SupervisorHandle {
    pub(crate) stop: tokio::sync::watch::Sender<bool>,
    pub(crate) join: tokio::task::JoinHandle<anyhow::Result<()>>,
}

/// Clonable stop trigger, detachable from the supervisor handle so a signal
/// handler can request a stop while the main task waits on the handle.
#[derive(Clone)]
pub struct StopHandle {
    stop: tokio::sync::watch::Sender<bool>,
}

impl StopHandle {
    /// Ask every worker to stop. Running search processes are killed; the
    /// server expires and reissues their ranges.
    pub fn request_stop(&self) {
        let _ = self.stop.send(true);
    }
}

impl SupervisorHandle {
    /// Detach a stop trigger for this supervisor.
    pub fn stopper(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
        }
    }

    /// Ask every worker to stop. See [`StopHandle::request_stop`].
    pub fn request_stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait for all workers to exit, returning the supervisor result.
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        match (&mut self.join).await {
            Ok(res) => res,
            Err(err) => Err(anyhow::anyhow!("supervisor task join error: {err}")),
        }
    }
}

/// Start the supervisor: spawn one worker per available core (minus the
/// configured idle cores), staggered one per second, and drain their
/// reports until stopped.
pub fn start_supervisor(config: SupervisorConfig) -> SupervisorHandle {
    crate::supervisor::start(config)
}
