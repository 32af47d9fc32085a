//! issuetree configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file exists.

use issuetree_tracker::github::GITHUB_API_URL;
use issuetree_tracker::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "issuetree.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite ledger file.
    pub state_db_path: PathBuf,
    /// Directory for the daily log file.
    pub log_directory: PathBuf,
    /// Filter used when `RUST_LOG` is not set.
    pub log_level: String,
    /// ANSI colors on stderr.
    pub enable_color: bool,
    pub retry: RetryConfig,
    pub github: GitHubConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per issue creation.
    pub attempts: u32,
    /// Attempts per sub-issue link.
    pub link_attempts: u32,
    /// Wait after the first failed attempt, doubled after each further one.
    pub backoff_seconds: u64,
    /// Bound on a single tracker call.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    /// Create labels the batch uses but the repository lacks.
    pub create_missing_labels: bool,
}

// ============================================================
// Defaults
// ============================================================

impl Default for Config {
    fn default() -> Self {
        Self {
            state_db_path: PathBuf::from(".state/state.db"),
            log_directory: PathBuf::from("logs"),
            log_level: "info".into(),
            enable_color: true,
            retry: RetryConfig::default(),
            github: GitHubConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.create_attempts,
            link_attempts: policy.link_attempts,
            backoff_seconds: policy.base_delay.as_secs(),
            timeout_seconds: policy.attempt_timeout.as_secs(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: GITHUB_API_URL.into(),
            create_missing_labels: false,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::debug!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for `init-config`).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            create_attempts: self.retry.attempts.max(1),
            link_attempts: self.retry.link_attempts.max(1),
            base_delay: Duration::from_secs(self.retry.backoff_seconds),
            attempt_timeout: Duration::from_secs(self.retry.timeout_seconds.max(1)),
        }
    }
}
