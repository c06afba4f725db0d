//! Dispatcher: event registry and synchronous fan-out
//!
//! Maps event names to ordered handler lists and publishes to them:
//! - Registration resolves every handler form into a [`Handler`] up front
//! - Wildcard handlers (`"*"`) fire before the event's own handlers
//! - Handlers run on the caller's thread, in order, and the first failure
//!   aborts the rest of that publish
//!
//! One lock guards the registry. It is held for registration, removal and
//! the snapshot a publish takes, never while handlers run, so handlers and
//! subscribers may register further handlers. Unit loads are serialized by
//! a separate reentrant lock, so a unit being loaded may itself register
//! handlers from other units.
//!
//! `Dispatcher` deliberately has no `Clone`:
//!
//! ```compile_fail
//! let dispatcher = dispatch_core::Dispatcher::builder().build();
//! let copy = dispatcher.clone();
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ahash::RandomState;
use compact_str::CompactString;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex};
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

use crate::config::Binding;
use crate::error::{DispatchError, Result};
use crate::event::{Event, Payload, WILDCARD};
use crate::functions::FunctionTable;
use crate::handler::{Handler, HandlerEntry, HandlerId, HandlerSpec, Placement, Target};
use crate::loader::{UnitCatalog, UnitLoader};
use crate::subscriber::Subscriber;

/// Snapshot of the registry: event name to handlers, in registration order.
pub type HandlerMap = IndexMap<CompactString, Vec<HandlerEntry>, RandomState>;

static GLOBAL: OnceCell<Dispatcher> = OnceCell::new();

pub struct Dispatcher {
    registry: Mutex<HandlerMap>,

    // Namespace named handlers and loaded units resolve against
    functions: Arc<FunctionTable>,

    loader: Arc<dyn UnitLoader>,

    // Canonical paths already handed to the loader
    loaded: ReentrantMutex<RefCell<HashSet<PathBuf, RandomState>>>,
}

pub struct DispatcherBuilder {
    functions: Option<Arc<FunctionTable>>,
    loader: Option<Arc<dyn UnitLoader>>,
}

impl DispatcherBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            functions: None,
            loader: None,
        }
    }

    /// Resolve names against `functions` instead of the process-wide table.
    #[must_use]
    pub fn functions(mut self, functions: Arc<FunctionTable>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Load units with `loader` instead of the process-wide catalog.
    #[must_use]
    pub fn loader(mut self, loader: impl UnitLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        let loader: Arc<dyn UnitLoader> = match self.loader {
            Some(loader) => loader,
            None => UnitCatalog::global(),
        };

        Dispatcher {
            registry: Mutex::new(HandlerMap::default()),
            functions: self.functions.unwrap_or_else(FunctionTable::global),
            loader,
            loaded: ReentrantMutex::new(RefCell::new(HashSet::default())),
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub const fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// The process-wide dispatcher, created with defaults on first access
    /// unless [`Dispatcher::install_global`] ran earlier.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            info!("Global dispatcher initialized with defaults");
            Self::builder().build()
        })
    }

    /// Make `dispatcher` the process-wide instance. Fails once the global
    /// dispatcher exists, whether installed or created on first access.
    pub fn install_global(dispatcher: Self) -> Result<&'static Self> {
        GLOBAL
            .set(dispatcher)
            .map_err(|_| DispatchError::GlobalAlreadyInitialized)?;

        info!("Global dispatcher installed");
        GLOBAL.get().ok_or(DispatchError::GlobalAlreadyInitialized)
    }

    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    /// Append `spec` to `event` with no default payload.
    pub fn register(&self, event: &str, spec: impl Into<HandlerSpec>) -> Result<()> {
        self.register_with(event, spec, None, Placement::Append)
    }

    /// Resolve `spec` and store it with its default payload.
    ///
    /// Resolution finishes before the registry is touched, so a failed
    /// registration changes nothing.
    pub fn register_with(
        &self,
        event: &str,
        spec: impl Into<HandlerSpec>,
        default_payload: Option<Payload>,
        placement: Placement,
    ) -> Result<()> {
        let handler = self.resolve(spec.into())?;
        let id = handler.id().clone();
        let entry = HandlerEntry::new(handler, default_payload);

        {
            let mut registry = self.registry.lock();
            let entries = registry.entry(CompactString::new(event)).or_default();

            match placement {
                Placement::Append => entries.push(entry),
                Placement::Prepend => entries.insert(0, entry),
            }
        }

        info!("Registered {} for event '{}' ({:?})", id, event, placement);
        Ok(())
    }

    fn resolve(&self, spec: HandlerSpec) -> Result<Handler> {
        match spec {
            HandlerSpec::Named(name) => self
                .functions
                .resolve(&name)
                .ok_or_else(|| DispatchError::unresolved(name.as_str())),

            HandlerSpec::Pair(Target::Object(target), method) => {
                if target.responds_to(&method) {
                    Ok(Handler::method(target, method))
                } else {
                    Err(DispatchError::not_callable(method.as_str()))
                }
            }

            HandlerSpec::Pair(Target::Path(path), function) => {
                self.load_unit(&path)?;

                self.functions
                    .resolve(&function)
                    .ok_or_else(|| DispatchError::unresolved_in(function.as_str(), path))
            }

            HandlerSpec::Closure(handler) => Ok(handler),
        }
    }

    /// Load the unit at `path` once; repeated loads are no-ops.
    fn load_unit(&self, path: &Path) -> Result<()> {
        let readable = path.exists() && File::open(path).is_ok();
        if !readable {
            return Err(DispatchError::file_not_found(path));
        }

        let canonical = path
            .canonicalize()
            .map_err(|_| DispatchError::file_not_found(path))?;

        // Held across the load; only this thread can re-enter it
        let loaded = self.loaded.lock();
        if loaded.borrow().contains(&canonical) {
            trace!("Unit {} already loaded", canonical.display());
            return Ok(());
        }

        // Marked up front so a unit naming itself is not loaded again
        loaded.borrow_mut().insert(canonical.clone());

        if let Err(source) = self.loader.load(&canonical, &self.functions) {
            loaded.borrow_mut().remove(&canonical);
            return Err(DispatchError::LoadFailed {
                path: path.to_path_buf(),
                source,
            });
        }

        debug!("Loaded unit {}", canonical.display());
        Ok(())
    }

    /// Remove handlers from `event`.
    ///
    /// With `handler` unset the whole event goes; otherwise every entry whose
    /// handler has that identity is removed and the rest keep their order.
    /// An event left without handlers is dropped from the registry, so
    /// [`Dispatcher::handlers`] never lists an empty event.
    /// Returns whether anything was removed.
    pub fn unregister(&self, event: &str, handler: Option<&HandlerId>) -> bool {
        let mut registry = self.registry.lock();

        let Some(entries) = registry.get_mut(event).filter(|entries| !entries.is_empty()) else {
            return false;
        };

        let Some(id) = handler else {
            registry.shift_remove(event);
            info!("Removed all handlers for event '{}'", event);
            return true;
        };

        let before = entries.len();
        entries.retain(|entry| entry.handler().id() != id);
        let removed = before - entries.len();

        if entries.is_empty() {
            registry.shift_remove(event);
        }

        if removed > 0 {
            info!("Removed {} x{} from event '{}'", id, removed, event);
        }

        removed > 0
    }

    /// True if `event` itself has handlers; wildcard handlers don't count.
    #[must_use]
    pub fn has_handlers(&self, event: &str) -> bool {
        self.registry
            .lock()
            .get(event)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Copy of the whole registry.
    #[must_use]
    pub fn handlers(&self) -> HandlerMap {
        self.registry.lock().clone()
    }

    pub fn clear_all(&self) {
        let mut registry = self.registry.lock();
        let cleared = registry.len();
        registry.clear();

        info!("Cleared handlers for {} event(s)", cleared);
    }

    /// Invoke every wildcard handler, then every handler of `event`.
    ///
    /// Each handler receives `payload` when it is set, or its own default
    /// payload otherwise. The first handler error stops the publish and is
    /// returned as-is.
    pub fn publish(&self, event: &str, payload: Option<Payload>) -> anyhow::Result<()> {
        let publish_start: Instant = Instant::now();

        let dispatch: SmallVec<[HandlerEntry; 8]> = {
            let registry = self.registry.lock();

            registry
                .get(WILDCARD)
                .into_iter()
                .chain(registry.get(event))
                .flatten()
                .cloned()
                .collect()
        };

        if dispatch.is_empty() {
            trace!("No handlers for event '{}'", event);
            return Ok(());
        }

        for entry in &dispatch {
            let data = payload
                .clone()
                .or_else(|| entry.default_payload().cloned());
            let message = Event::new(event, data);

            if let Err(e) = entry.handler().call(&message) {
                warn!(
                    "Handler {} failed on event '{}': {}",
                    entry.handler().id(),
                    event,
                    e
                );
                return Err(e);
            }
        }

        debug!(
            "Event '{}' dispatched to {} handler(s) in {:?}",
            event,
            dispatch.len(),
            publish_start.elapsed()
        );

        Ok(())
    }

    /// Let `subscriber` register its own handlers. Its routine runs exactly once.
    pub fn subscribe<S: Subscriber + ?Sized>(&self, subscriber: Arc<S>) -> Result<()> {
        subscriber.subscribe(self)
    }

    /// Register declarative bindings in order, stopping at the first failure.
    /// Returns how many were registered.
    pub fn bind(&self, bindings: &[Binding]) -> Result<usize> {
        for binding in bindings {
            let spec = HandlerSpec::try_from(&binding.handler)?;
            let payload = binding.payload.clone().map(Payload::new);

            self.register_with(&binding.event, spec, payload, binding.placement)?;
        }

        Ok(bindings.len())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("event_count", &self.registry.lock().len())
            .field("loaded_units", &self.loaded.lock().borrow().len())
            .finish()
    }
}
