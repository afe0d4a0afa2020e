//! Relay configuration loaded from TOML
//!
//! Destinations are configured here as well: the relay only reads them, and
//! the configuration file is the administration surface that owns them.

use crate::model::{normalize_format, Destination};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Strategy selectors the relay ships with
pub const KNOWN_FORMATS: &[&str] = &["api", "email"];

/// Main relay configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    pub worker: WorkerSection,
    pub storage: StorageSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub email: EmailSection,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSection {
    /// Worker identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Number of concurrent workers (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deliveries per task before it is dead-lettered (default: 5)
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_deliveries() -> u32 {
    5
}

/// Record store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    /// Directory holding `requests/` and `raw/`
    pub data_dir: PathBuf,
}

/// HTTP API strategy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSection {
    /// Request timeout in milliseconds (default: 30000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Header carrying the destination's shared secret
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_secret_header() -> String {
    "X-Submission-Secret".to_string()
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            secret_header: default_secret_header(),
        }
    }
}

impl ApiSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Email strategy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailSection {
    /// Sender address on relayed messages
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Directory the spool mailer writes outgoing messages to
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
}

fn default_from_address() -> String {
    "relay@localhost".to_string()
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("outbox")
}

impl Default for EmailSection {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            spool_dir: default_spool_dir(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid worker ID format: {0}")]
    InvalidWorkerId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_worker_id(&self.worker.id)?;

        if self.worker.concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }
        if self.worker.max_deliveries == 0 {
            return Err(ConfigError::InvalidConfig(
                "worker.max_deliveries must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for destination in &self.destinations {
            validate_destination(destination)?;
            if !seen.insert(destination.id.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate destination id '{}'",
                    destination.id
                )));
            }
        }

        Ok(())
    }

    /// Resolve the shared secret for an API destination at runtime
    pub fn api_secret(destination: &Destination) -> Result<Option<String>, ConfigError> {
        match &destination.api_secret_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(var.clone())),
            None => Ok(None),
        }
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[worker]
id = "test-relay"

[storage]
data_dir = "/tmp/relay-test"

[[destinations]]
id = "D1"
name = "Records Office"
submission_format = "api"
api_url = "http://localhost:9999/submissions"

[[destinations]]
id = "D2"
name = "Mailroom"
submission_format = "email"
email_address = "mailroom@example.org"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate worker ID format
fn validate_worker_id(worker_id: &str) -> Result<(), ConfigError> {
    let valid_chars = worker_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if worker_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidWorkerId(format!(
            "Worker ID '{worker_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

fn validate_destination(destination: &Destination) -> Result<(), ConfigError> {
    if destination.id.as_str().trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "destination id must not be empty".to_string(),
        ));
    }

    if let Some(api_url) = &destination.api_url {
        let parsed = url::Url::parse(api_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "destination '{}' has invalid api_url '{api_url}': {e}",
                destination.id
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidConfig(format!(
                "destination '{}' api_url must use http or https",
                destination.id
            )));
        }
    }

    // Unknown selectors are reported per request by the strategy factory
    let format = normalize_format(&destination.submission_format);
    if !KNOWN_FORMATS.contains(&format.as_str()) {
        warn!(
            destination_id = %destination.id,
            submission_format = %destination.submission_format,
            "Destination uses a submission format with no built-in strategy"
        );
    }

    Ok(())
}
