//! Optional configuration file
//!
//! Location: ~/.config/vsync/config.yaml (or `--config <file>`)
//!
//! Every field is optional; command-line flags override whatever is set
//! here. Tokens are deliberately not read from this file, they come from
//! flags or the SRC_VAULT_TOKEN / DEST_VAULT_TOKEN environment variables.
//!
//! ```yaml
//! source:
//!   addr: https://vault-primary:8200
//!   mount: secret
//! destination:
//!   addr: https://vault-dr:8200
//!   mount: secret
//!   ca_cert: /etc/vsync/dr-ca.pem
//! path: apps/
//! concurrency: 8
//! on_error: best-effort
//! on_list_error: fail-fast
//! timeout_secs: 600
//! retry:
//!   max_attempts: 5
//! ```

use crate::retry::RetryConfig;
use crate::walker::PolicyMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection settings for one side of the replication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub addr: Option<String>,
    pub mount: Option<String>,
    pub namespace: Option<String>,
    pub ca_cert: Option<PathBuf>,
    pub tls_skip_verify: Option<bool>,
}

/// Retry overrides, applied on top of the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<usize>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Contents of config.yaml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source: StoreSection,
    pub destination: StoreSection,
    /// Base path to replicate
    pub path: Option<String>,
    pub concurrency: Option<usize>,
    /// Policy for leaf read/write failures
    pub on_error: Option<PolicyMode>,
    /// Policy for container listing failures
    pub on_list_error: Option<PolicyMode>,
    /// Whole-run timeout
    pub timeout_secs: Option<u64>,
    /// Per-request timeout
    pub request_timeout_secs: Option<u64>,
    pub retry: RetrySection,
}

impl FileConfig {
    /// ~/.config/vsync/config.yaml
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vsync").join("config.yaml"))
    }

    /// Load from the default location; a missing file means no overrides
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific file, which must exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == Some(0) {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Default retry policy with this file's overrides applied
    pub fn retry_config(&self) -> RetryConfig {
        let mut retry = RetryConfig::default();
        if let Some(attempts) = self.retry.max_attempts {
            retry.max_attempts = attempts;
        }
        if let Some(ms) = self.retry.initial_delay_ms {
            retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry.max_delay_ms {
            retry.max_delay = Duration::from_millis(ms);
        }
        retry
    }
}
