use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extract::LlmSettings;
use graph::{LayoutConfig, RenderStyle};
use ingest::DissectorConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "PACKET_GRAPH_CONFIG";
pub const BIND_ENV: &str = "PACKET_GRAPH_BIND";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub dissector: DissectorConfig,
    pub llm: LlmSettings,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub layout: LayoutConfig,
    pub style: RenderStyle,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
    /// Unconfirmed or finished sessions are forgotten after this long.
    pub session_ttl_secs: u64,
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    /// Where the rendered graph document is written; replaced on every run.
    pub output_path: PathBuf,
    pub accepted_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 256 * 1024 * 1024,
            session_ttl_secs: 60 * 60,
            max_sessions: 1024,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("temp"),
            output_path: PathBuf::from("graph.html"),
            accepted_extensions: vec!["pcap".into(), "pcapng".into(), "cap".into()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("Invalid configuration")
    }

    /// Read the file named explicitly or by `PACKET_GRAPH_CONFIG` (defaults if neither),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                let source = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&source)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment wins over the file for the bind address; the file wins for the key.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup(extract::llm::OPENAI_API_KEY_VAR);
        }
        if let Some(bind) = lookup(BIND_ENV) {
            self.server.bind = bind;
        }
    }
}
