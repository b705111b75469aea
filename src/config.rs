use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::RetryPolicy;
use crate::storage::StorageOptions;

const DEFAULT_DATABASE_PATH: &str = "creditbook.db";

/// Runtime settings. Every field has a default so a config file only needs
/// the keys it wants to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Entries shown in an account summary
    pub recent_transactions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.into(),
            max_connections: 8,
            busy_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
            recent_transactions: 10,
        }
    }
}

impl Config {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config.normalized())
    }

    /// Load `path` when given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path)
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            max_connections: self.max_connections.max(1),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    fn normalized(mut self) -> Self {
        let retry = &self.retry;
        self.retry = RetryPolicy::new(
            retry.max_attempts,
            retry.base_delay_ms,
            retry.max_delay_ms,
            retry.jitter_pct,
        );
        self
    }
}
