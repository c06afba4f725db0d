//! src/config.rs
//! ============================================================================
//! # Config: Dispatcher Configuration Loader
//!
//! Declarative handler bindings and logging settings, read as TOML. The
//! default file lives in the platform config directory resolved with the
//! [`directories`](https://docs.rs/directories) crate.
//!
//! ## Example
//! ```toml
//! [logging]
//! log_level = "debug"
//!
//! [[bindings]]
//! event = "login"
//! handler = "audit_login"
//!
//! [[bindings]]
//! event = "*"
//! handler = ["units/metrics.unit", "count_event"]
//! placement = "prepend"
//! payload = { source = "config" }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DispatchError, Result};
use crate::handler::Placement;
use crate::logging::LoggerConfig;

/// One handler registration described in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub event: CompactString,

    /// Function name, or `[path, function]`. Checked when bound.
    pub handler: toml::Value,

    /// Default payload, handed to the handler as a `toml::Value`.
    #[serde(default)]
    pub payload: Option<toml::Value>,

    #[serde(default)]
    pub placement: Placement,
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub logging: LoggerConfig,

    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl DispatchConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading config from {}", path.display());

        let text = fs::read_to_string(path).map_err(|source| DispatchError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    /// Loads the file at [`DispatchConfig::config_path`], or defaults if there is none.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            Ok(Self::load(&path)?)
        } else {
            info!(
                "No config file found at {}, using default configuration",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("dispatch.toml"))
    }

    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "example", "Dispatch")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }
}
