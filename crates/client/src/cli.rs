use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "dragnet-client", version, about = "dragnet search worker")]
pub struct Cli {
    /// Path to the client configuration file.
    #[arg(
        short = 'c',
        long,
        env = "DRAGNET_CLIENT_CONFIG",
        default_value = "client.toml"
    )]
    pub config: PathBuf,
}
