//! Configuration for dispatch, queueing, and cluster keep-alive.
//!
//! Supports YAML file and environment variable overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TRESTLE_CONFIG";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TRESTLE_LOG";

/// Errors raised at construction time. Fatal at startup, never recoverable
/// at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Proxy requires a target service identity")]
    MissingTarget,

    #[error("No interceptor chain source configured")]
    MissingChain,

    #[error("Dispatcher requires a service registry")]
    MissingRegistry,
}

/// Named options for the dispatch subsystem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Only this target identity may be addressed explicitly; a mismatching
    /// context target is denied. `None` disables the allow-list check.
    pub allowed_target: Option<String>,
    /// Fallback identity for contexts that carry no target.
    pub default_target: Option<String>,
    /// Retries after the first failed queued dispatch attempt.
    pub retry_limit: usize,
    /// Bounded capacity of the dispatch queue.
    pub queue_capacity: usize,
    /// Upper bound on one queue wait, so the consumer can observe shutdown.
    pub poll_interval_ms: u64,
    /// Period of the cluster keep-alive sweep.
    pub keep_alive_interval_ms: u64,
    /// Consecutive failed pings before a member is marked unreachable.
    pub keep_alive_failure_threshold: u32,
    /// Build a fresh chain per call instead of reusing shared instances.
    pub create_chain_per_call: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            allowed_target: None,
            default_target: None,
            retry_limit: 3,
            queue_capacity: 256,
            poll_interval_ms: 250,
            keep_alive_interval_ms: 5000,
            keep_alive_failure_threshold: 3,
            create_chain_per_call: false,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(target) = std::env::var("TRESTLE_ALLOWED_TARGET") {
            self.allowed_target = Some(target);
        }

        if let Ok(target) = std::env::var("TRESTLE_DEFAULT_TARGET") {
            self.default_target = Some(target);
        }

        if let Ok(limit) = std::env::var("TRESTLE_RETRY_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.retry_limit = n;
            }
        }

        if let Ok(interval) = std::env::var("TRESTLE_KEEP_ALIVE_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.keep_alive_interval_ms = ms;
            }
        }

        if let Ok(threshold) = std::env::var("TRESTLE_KEEP_ALIVE_FAILURE_THRESHOLD") {
            if let Ok(n) = threshold.parse() {
                self.keep_alive_failure_threshold = n;
            }
        }

        if let Ok(per_call) = std::env::var("TRESTLE_CHAIN_PER_CALL") {
            self.create_chain_per_call = per_call == "true" || per_call == "1";
        }
    }

    /// Reject option combinations that can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive_interval_ms == 0 {
            return Err(ConfigError::InvalidOption(
                "keep_alive_interval_ms must be greater than zero".into(),
            ));
        }
        if self.keep_alive_failure_threshold == 0 {
            return Err(ConfigError::InvalidOption(
                "keep_alive_failure_threshold must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidOption(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidOption(
                "queue_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Bounded queue wait as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Keep-alive sweep period as a duration.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}
