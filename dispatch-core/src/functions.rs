//! The global function namespace.
//!
//! Named handlers resolve against a [`FunctionTable`]. Units loaded from a
//! path extend the same table, which is why a function loaded from a file is
//! afterwards indistinguishable from one defined up front.

use std::sync::Arc;

use ahash::RandomState;
use compact_str::CompactString;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::event::Event;
use crate::handler::Handler;

static GLOBAL_FUNCTIONS: Lazy<Arc<FunctionTable>> = Lazy::new(|| Arc::new(FunctionTable::new()));

#[derive(Default)]
pub struct FunctionTable {
    functions: RwLock<HashMap<CompactString, Handler, RandomState>>,
}

impl FunctionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table used by dispatchers that are not given their own.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_FUNCTIONS)
    }

    /// Define (or redefine) `name`, returning the handler now bound to it.
    pub fn define<F>(&self, name: impl Into<CompactString>, f: F) -> Handler
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let name: CompactString = name.into();
        let handler = Handler::function(name.clone(), f);

        if self
            .functions
            .write()
            .insert(name.clone(), handler.clone())
            .is_some()
        {
            debug!("Redefined function {}", name);
        } else {
            debug!("Defined function {}", name);
        }

        handler
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Handler> {
        self.functions.read().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Handler> {
        self.functions.write().remove(name)
    }

    /// Defined names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<CompactString> {
        let mut names: Vec<CompactString> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTable")
            .field("function_count", &self.len())
            .finish()
    }
}
