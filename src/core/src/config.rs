use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ArchiveError, Result};
use crate::retry::RetryConfig;

/// Default number of layers filled in concurrently.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Archive writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum number of concurrent fill tasks.
    ///
    /// Values above 1 enable placeholder writes followed by a parallel
    /// fill pass when the destination is seekable.
    pub concurrency: usize,

    /// Retry policy for fill tasks
    pub retry: RetryConfig,

    /// Include foreign / non-distributable layers
    pub include_non_distributable: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryConfig::default(),
            include_non_distributable: false,
            log_level: LogLevel::Info,
        }
    }
}

impl WriterConfig {
    /// Sequential writer: no placeholders, no fill pass.
    pub fn sequential() -> Self {
        Self {
            concurrency: 1,
            ..Self::default()
        }
    }

    /// Set the maximum number of concurrent fill tasks.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from a YAML file.
    ///
    /// Missing fields take their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a write.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ArchiveError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ArchiveError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ArchiveError::ConfigError(format!(
                "retry.backoff_multiplier must be a finite number of at least 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
