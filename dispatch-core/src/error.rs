//! src/error.rs
//! ============================================================================
//! # `DispatchError`: Unified Error Type for the Dispatcher
//!
//! Every failure the dispatcher itself can raise lives here. Registration
//! errors are raised before the registry is touched, so a failed `register`
//! never leaves a partial mutation behind. Errors raised *inside* handlers are
//! not part of this enum: they travel back from `publish` untouched as
//! `anyhow::Error`.

use std::{io, path::Path, path::PathBuf};
use thiserror::Error;

/// Unified error type for dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Handler value is not a function name, a `[target, name]` pair or a closure.
    #[error("Invalid handler type: expected a function name, a [target, name] pair or a closure, got {found}")]
    InvalidHandlerType { found: String },

    /// A named function (or a function expected from a loaded file) does not resolve.
    #[error("{}", describe_unresolved(.name, .file.as_deref()))]
    UnresolvedFunction { name: String, file: Option<PathBuf> },

    /// Pair target is an object that does not respond to the named method.
    #[error("The object is not callable: no method `{method}`")]
    NotCallable { method: String },

    /// Pair target, taken as a path, is missing or unreadable.
    #[error("The file {path:?} does not exist or is not readable")]
    FileNotFound { path: PathBuf },

    /// The loader failed while loading an existing file.
    #[error("Failed to load unit {path:?}: {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The process-wide dispatcher was already created.
    #[error("Global dispatcher already initialized")]
    GlobalAlreadyInitialized,

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn describe_unresolved(name: &str, file: Option<&Path>) -> String {
    match file {
        Some(file) => format!("The function {name} in file {} does not exist", file.display()),
        None => format!("The global function {name} does not exist"),
    }
}

impl DispatchError {
    /// Create an invalid handler type error
    pub fn invalid_handler_type<S: Into<String>>(found: S) -> Self {
        Self::InvalidHandlerType {
            found: found.into(),
        }
    }

    /// Create an unresolved global function error
    pub fn unresolved<S: Into<String>>(name: S) -> Self {
        Self::UnresolvedFunction {
            name: name.into(),
            file: None,
        }
    }

    /// Create an unresolved function error for a function expected in `file`
    pub fn unresolved_in<S: Into<String>, P: Into<PathBuf>>(name: S, file: P) -> Self {
        Self::UnresolvedFunction {
            name: name.into(),
            file: Some(file.into()),
        }
    }

    pub fn not_callable<S: Into<String>>(method: S) -> Self {
        Self::NotCallable {
            method: method.into(),
        }
    }

    pub fn file_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
