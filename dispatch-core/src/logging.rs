//! Tracing setup.
//!
//! The library itself only emits `tracing` events. Binaries and test
//! harnesses call [`LoggerBuilder::build`] once to install a subscriber: an
//! `EnvFilter`, a console `fmt` layer and, when a log directory is set, a
//! non-blocking rolling JSON file.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,

    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,

    #[default]
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_level: CompactString,
    pub format: LogFormat,

    /// Directory for rolling JSON logs; console only when unset.
    pub log_dir: Option<PathBuf>,

    pub log_file_prefix: CompactString,
    pub rotation: LogRotation,
    pub max_log_files: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: CompactString::const_new("info"),
            format: LogFormat::Pretty,
            log_dir: None,
            log_file_prefix: CompactString::const_new("dispatch"),
            rotation: LogRotation::Daily,
            max_log_files: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// Logger builder
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoggerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: &str) -> Self {
        self.config.log_level = CompactString::new(level);
        self
    }

    /// Install the global subscriber. The returned guard, if any, flushes the
    /// file writer on drop and must be kept alive.
    pub fn build(self) -> Result<Option<WorkerGuard>, LoggingError> {
        validate_config(&self.config)?;

        let level = self.config.log_level.clone();
        let make_filter = || -> Result<EnvFilter, LoggingError> {
            let directive = Directive::from_str(&level)
                .map_err(|e| LoggingError::ConfigError(format!("Invalid log level: {e}")))?;
            Ok(EnvFilter::from_default_env().add_directive(directive))
        };

        let console_layer = match self.config.format {
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed(),
        }
        .with_filter(make_filter()?);

        let (file_layer, guard) = match &self.config.log_dir {
            Some(log_dir) => {
                std::fs::create_dir_all(log_dir)?;

                let rotation = match self.config.rotation {
                    LogRotation::Never => Rotation::NEVER,
                    LogRotation::Daily => Rotation::DAILY,
                };

                let appender = RollingFileAppender::builder()
                    .rotation(rotation)
                    .filename_prefix(self.config.log_file_prefix.as_str())
                    .filename_suffix("jsonl")
                    .max_log_files(self.config.max_log_files)
                    .build(log_dir)
                    .map_err(|e| LoggingError::InvalidLogDirectory(e.to_string()))?;

                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(make_filter()?);

                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)?;

        Ok(guard)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_config(config: &LoggerConfig) -> Result<(), LoggingError> {
    if config.log_level.trim().is_empty() {
        return Err(LoggingError::ConfigError(
            "Log level must not be empty".to_string(),
        ));
    }

    if config.max_log_files == 0 {
        return Err(LoggingError::ConfigError(
            "Max log files must be greater than 0".to_string(),
        ));
    }

    if let Some(log_dir) = &config.log_dir {
        validate_log_directory(log_dir)?;
    }

    Ok(())
}

fn validate_log_directory(path: &Path) -> Result<(), LoggingError> {
    if path.components().count() == 0 {
        return Err(LoggingError::InvalidLogDirectory("Empty path".to_string()));
    }

    if path.components().any(|c| c == Component::ParentDir) {
        return Err(LoggingError::InvalidLogDirectory(
            "Path contains parent directory references".to_string(),
        ));
    }

    Ok(())
}
