//! Signal handling for the worker client.
//!
//! The first ctrl-c (or SIGTERM) asks the supervisor to stop: workers kill
//! their running search processes, the server expires the abandoned ranges,
//! and the process exits once the report channel drains. A repeated signal
//! forces the process down after a bounded wait.

use tokio::sync::mpsc;

/// Stop requests delivered to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// First signal: stop workers and drain.
    Graceful,
    /// Repeated signal: tear the process down now.
    Forced,
}

/// Spawn the signal listener. The first ctrl-c or SIGTERM maps to
/// [`StopRequest::Graceful`], any further signal to [`StopRequest::Forced`],
/// after which the listener exits.
pub fn spawn_signal_listener() -> mpsc::UnboundedReceiver<StopRequest> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();

        let mut received = 0u32;
        loop {
            let signal = async {
                #[cfg(unix)]
                if let Some(terminate) = terminate.as_mut() {
                    return tokio::select! {
                        res = tokio::signal::ctrl_c() => res.is_ok(),
                        _ = terminate.recv() => true,
                    };
                }
                tokio::signal::ctrl_c().await.is_ok()
            };
            if !signal.await {
                return;
            }

            received += 1;
            let request = if received == 1 {
                StopRequest::Graceful
            } else {
                StopRequest::Forced
            };
            if tx.send(request).is_err() || request == StopRequest::Forced {
                return;
            }
        }
    });

    rx
}
