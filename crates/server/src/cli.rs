use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "dragnet-server", version, about = "dragnet search coordinator")]
pub struct Cli {
    /// Path to the server configuration file.
    #[arg(
        short = 'c',
        long,
        env = "DRAGNET_SERVER_CONFIG",
        default_value = "server.toml"
    )]
    pub config: PathBuf,
}
