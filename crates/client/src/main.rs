mod cli;
mod config;
mod shutdown;

use std::time::Duration;

use clap::Parser;

use dragnet_client_engine::{SupervisorConfig, start_supervisor};

use crate::cli::Cli;
use crate::config::ClientConfig;
use crate::shutdown::{StopRequest, spawn_signal_listener};

enum Outcome {
    Finished(anyhow::Result<()>),
    Forced,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.config)?;
    dragnet_core::logging::init(config.logger.file_path.as_deref())?;

    let server_url = config.server_url()?;
    tracing::info!(
        server = %server_url,
        binary = %config.search.binary_path.display(),
        "dragnet client {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let mut supervisor = start_supervisor(SupervisorConfig {
        server_url,
        api_key: config.server.api_key.clone(),
        request_delay: Duration::from_secs(config.server.request.delay_seconds),
        request_timeout: Duration::from_secs(config.server.request.timeout_seconds),
        binary_path: config.search.binary_path.clone(),
        idle_cores: config.search.idle_cores,
        results_path: config.search.file_path.clone(),
    });
    let stopper = supervisor.stopper();

    let mut signals = spawn_signal_listener();

    let outcome = loop {
        tokio::select! {
            res = supervisor.wait() => break Outcome::Finished(res),
            request = signals.recv() => match request {
                Some(StopRequest::Graceful) => {
                    tracing::info!(
                        "stop requested, shutting workers down (press ctrl-c again to exit immediately)"
                    );
                    stopper.request_stop();
                }
                Some(StopRequest::Forced) => break Outcome::Forced,
                None => {}
            },
        }
    };

    match outcome {
        Outcome::Finished(res) => res,
        Outcome::Forced => {
            // Workers kill their search processes when the stop flag flips;
            // give them a moment to do so, since `process::exit` runs no
            // destructors and would otherwise orphan the children.
            tracing::warn!("stop forced, killing running search processes");
            stopper.request_stop();
            if tokio::time::timeout(Duration::from_secs(2), supervisor.wait())
                .await
                .is_err()
            {
                tracing::warn!("workers did not stop in time, exiting anyway");
            }
            std::process::exit(130);
        }
    }
}
