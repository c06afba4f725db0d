//! Loading units of handler functions by path.
//!
//! A unit is a bundle of functions addressed by a file path. Loading it
//! defines its functions in a [`FunctionTable`]. The dispatcher only needs
//! the [`UnitLoader`] contract; [`UnitCatalog`] is the in-process
//! implementation, with units compiled into the binary and keyed by the
//! canonical path of the file that stands for them. Dispatchers built
//! without their own loader, the global one included, share
//! [`UnitCatalog::global`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::RandomState;
use anyhow::Context;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::functions::FunctionTable;

/// Capability to load the unit at `path` into `functions`.
///
/// The dispatcher checks that `path` exists before calling `load`, and calls
/// it at most once per canonical path.
#[cfg_attr(test, mockall::automock)]
pub trait UnitLoader: Send + Sync {
    fn load(&self, path: &Path, functions: &FunctionTable) -> anyhow::Result<()>;
}

impl<L: UnitLoader + ?Sized> UnitLoader for Arc<L> {
    fn load(&self, path: &Path, functions: &FunctionTable) -> anyhow::Result<()> {
        (**self).load(path, functions)
    }
}

type Installer = dyn Fn(&FunctionTable) + Send + Sync;

static GLOBAL_UNITS: Lazy<Arc<UnitCatalog>> = Lazy::new(|| Arc::new(UnitCatalog::new()));

/// Units registered in-process, keyed by canonical path.
#[derive(Default)]
pub struct UnitCatalog {
    units: RwLock<HashMap<PathBuf, Arc<Installer>, RandomState>>,
}

impl UnitCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide catalog used by dispatchers that are not given a loader.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_UNITS)
    }

    /// Register the unit standing for `path`. The path must exist.
    pub fn insert<F>(&self, path: impl AsRef<Path>, install: F) -> anyhow::Result<()>
    where
        F: Fn(&FunctionTable) + Send + Sync + 'static,
    {
        let path = path.as_ref();
        let canonical = path
            .canonicalize()
            .with_context(|| format!("Cannot register unit for {}", path.display()))?;

        debug!("Unit registered for {}", canonical.display());
        self.units.write().insert(canonical, Arc::new(install));
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.canonicalize()
            .is_ok_and(|canonical| self.units.read().contains_key(&canonical))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}

impl UnitLoader for UnitCatalog {
    fn load(&self, path: &Path, functions: &FunctionTable) -> anyhow::Result<()> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("Cannot resolve {}", path.display()))?;

        let install = self
            .units
            .read()
            .get(&canonical)
            .cloned()
            .with_context(|| format!("No unit registered for {}", canonical.display()))?;

        install(functions);
        Ok(())
    }
}

impl std::fmt::Debug for UnitCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitCatalog")
            .field("unit_count", &self.len())
            .finish()
    }
}
