//! Typed client configuration, loaded from a TOML file.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use reqwest::Url;
use serde::Deserialize;

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
    /// Coordinator endpoint and credentials.
    pub server: ServerSection,
    /// Search binary and local results sink.
    pub search: SearchSection,
    /// Logging destination.
    #[serde(default)]
    pub logger: LoggerSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerSection {
    /// `http` or `https`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Coordinator host.
    pub host: String,
    /// Coordinator port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared bearer token.
    pub api_key: String,
    /// Request pacing and timeout.
    #[serde(default)]
    pub request: RequestSection,
}

/// `[server.request]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestSection {
    /// Minimum spacing between two requests of one worker.
    #[serde(default = "default_delay")]
    pub delay_seconds: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchSection {
    /// Cores to leave idle; worker count is the core count minus this,
    /// floored at one.
    #[serde(default = "default_idle_cores")]
    pub idle_cores: usize,
    /// Search binary invoked as `<binaryPath> <start> <end>`.
    pub binary_path: PathBuf,
    /// Local results file (one JSON document per line, append-only).
    pub file_path: PathBuf,
}

/// `[logger]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggerSection {
    /// When set, logs are also appended to this file.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_delay() -> u64 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

fn default_idle_cores() -> usize {
    1
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            delay_seconds: default_delay(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read configuration {}", path.display()))?;
        let config: ClientConfig = toml::from_str(&raw)
            .with_context(|| format!("parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Coordinator base URL built from the `[server]` section.
    pub fn server_url(&self) -> anyhow::Result<Url> {
        let raw = format!(
            "{}://{}:{}/",
            self.server.protocol, self.server.host, self.server.port
        );
        Url::parse(&raw).with_context(|| format!("invalid server address {raw}"))
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self.server.protocol.as_str() {
            "http" | "https" => {}
            other => anyhow::bail!("server.protocol must be http or https, got '{other}'"),
        }
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.server.api_key.trim().is_empty() {
            anyhow::bail!("server.apiKey must not be empty");
        }
        if self.server.request.timeout_seconds == 0 {
            anyhow::bail!("server.request.timeoutSeconds must be positive");
        }
        if self.search.binary_path.as_os_str().is_empty() {
            anyhow::bail!("search.binaryPath must not be empty");
        }
        if self.search.file_path.as_os_str().is_empty() {
            anyhow::bail!("search.filePath must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(raw: &str) -> anyhow::Result<ClientConfig> {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, raw).unwrap();
        ClientConfig::load(&path)
    }

    #[test]
    fn full_configuration_parses() {
        let config = load_str(
            r#"
            [server]
            protocol = "http"
            host = "coordinator.example"
            port = 5000
            apiKey = "secret"

            [server.request]
            delaySeconds = 1
            timeoutSeconds = 30

            [search]
            idleCores = 1
            binaryPath = "./search.out"
            filePath = "./results.json"

            [logger]
            filePath = "./client.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "coordinator.example");
        assert_eq!(config.server.request.delay_seconds, 1);
        assert_eq!(config.search.idle_cores, 1);
        assert_eq!(
            config.server_url().unwrap().as_str(),
            "http://coordinator.example:5000/"
        );
    }

    #[test]
    fn request_section_defaults_apply() {
        let config = load_str(
            r#"
            [server]
            host = "127.0.0.1"
            apiKey = "secret"

            [search]
            binaryPath = "./search.out"
            filePath = "./results.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.protocol, "http");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.request.delay_seconds, 1);
        assert_eq!(config.server.request.timeout_seconds, 30);
        assert_eq!(config.logger.file_path, None);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        assert!(
            load_str(
                r#"
                [server]
                protocol = "ftp"
                host = "127.0.0.1"
                apiKey = "secret"

                [search]
                binaryPath = "./search.out"
                filePath = "./results.json"
                "#,
            )
            .is_err()
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = load_str(
            r#"
            [server]
            host = "127.0.0.1"
            apiKey = "secret"
            protocl = "http"

            [search]
            binaryPath = "./search.out"
            filePath = "./results.json"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("protocl"));
    }
}
