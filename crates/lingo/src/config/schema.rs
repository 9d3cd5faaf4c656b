use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Run a recovery scan this often. No scanner when unset.
    #[serde(default)]
    pub recovery_interval_ms: Option<u64>,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Claim ceiling per job. Unbounded when unset.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_write_retry")]
    pub write_retry: RetryPolicy,
    #[serde(default = "default_list_retry")]
    pub list_retry: RetryPolicy,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_busy_timeout_ms() -> u64 {
    3000
}

fn default_lease_duration_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

fn default_write_retry() -> RetryPolicy {
    RetryPolicy::WRITE
}

fn default_list_retry() -> RetryPolicy {
    RetryPolicy::LIST
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            lease_duration_ms: default_lease_duration_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            recovery_interval_ms: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_attempts: None,
            write_retry: RetryPolicy::WRITE,
            list_retry: RetryPolicy::LIST,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recovery_interval(&self) -> Option<Duration> {
        self.recovery_interval_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
