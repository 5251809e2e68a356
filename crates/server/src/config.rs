//! Typed server configuration, loaded from a TOML file.
//!
//! Field names match the configuration keys workers and operators already
//! know; unknown fields are rejected so typos fail loudly at startup.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared bearer token checked on every mutating route.
    pub api_key: String,
    /// Search persistence and job timing.
    pub search: SearchSection,
    /// Logging destination.
    #[serde(default)]
    pub logger: LoggerSection,
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchSection {
    /// Checkpoint file path.
    pub file_path: PathBuf,
    /// Job timing knobs reported to workers.
    #[serde(default)]
    pub job: JobSection,
}

/// `[search.job]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobSection {
    /// Duration one job should take; workers size their ranges toward it.
    #[serde(default = "default_target_duration")]
    pub target_duration_seconds: u64,
    /// Heartbeat cadence workers should use.
    #[serde(default = "default_update_interval")]
    pub update_interval_seconds: u64,
    /// Seconds without a heartbeat before the server expires a job.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// `[logger]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggerSection {
    /// When set, logs are also appended to this file.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_target_duration() -> u64 {
    600
}

fn default_update_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    120
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            target_duration_seconds: default_target_duration(),
            update_interval_seconds: default_update_interval(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ServerConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read configuration {}", path.display()))?;
        let config: ServerConfig = toml::from_str(&raw)
            .with_context(|| format!("parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.trim().is_empty() {
            anyhow::bail!("apiKey must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("port must not be 0");
        }
        if self.search.file_path.as_os_str().is_empty() {
            anyhow::bail!("search.filePath must not be empty");
        }
        let job = &self.search.job;
        if job.target_duration_seconds == 0 {
            anyhow::bail!("search.job.targetDurationSeconds must be positive");
        }
        if job.update_interval_seconds == 0 {
            anyhow::bail!("search.job.updateIntervalSeconds must be positive");
        }
        if job.timeout_seconds == 0 {
            anyhow::bail!("search.job.timeoutSeconds must be positive");
        }
        Ok(())
    }
}
