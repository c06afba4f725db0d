//! Handler values and the registration forms they are resolved from.
//!
//! Four registration forms exist: a global function name, an object bound to
//! one of its methods, a file path paired with a function name, and a closure.
//! All of them are normalized into a single [`Handler`] before being stored, so
//! nothing past registration ever inspects the original form again.
//!
//! Function identities come only from a `FunctionTable`; a closure cannot
//! claim one:
//!
//! ```compile_fail
//! let handler = dispatch_core::Handler::function("trim", |_| Ok(()));
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::event::{Event, Payload};

type Callback = dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync;

static NEXT_CLOSURE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a normalized handler. Removal matches on this, never on the
/// arguments the handler was registered with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerId {
    /// Function from the global namespace, including functions loaded from a file.
    Function(CompactString),

    /// Method bound to a live object; `target` is the object's address.
    Method { target: usize, method: CompactString },

    /// Anonymous function, unique per construction.
    Closure(u64),
}

impl HandlerId {
    pub fn function(name: impl Into<CompactString>) -> Self {
        Self::Function(name.into())
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(name) => write!(f, "fn {name}"),
            Self::Method { target, method } => write!(f, "{target:#x}::{method}"),
            Self::Closure(id) => write!(f, "closure#{id}"),
        }
    }
}

/// Objects whose methods can be bound as handlers.
pub trait MethodTarget: Send + Sync + 'static {
    fn responds_to(&self, method: &str) -> bool;

    fn invoke(&self, method: &str, event: &Event) -> anyhow::Result<()>;
}

/// The uniform invocable every registration form resolves to.
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    callback: Arc<Callback>,
}

impl Handler {
    /// Anonymous handler with a fresh identity.
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::Closure(NEXT_CLOSURE_ID.fetch_add(1, Ordering::Relaxed)),
            callback: Arc::new(f),
        }
    }

    /// Handler identified by a function name. Only a [`FunctionTable`] hands
    /// these out, so closures can never borrow a function's identity.
    ///
    /// [`FunctionTable`]: crate::functions::FunctionTable
    pub(crate) fn function<F>(name: impl Into<CompactString>, f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::Function(name.into()),
            callback: Arc::new(f),
        }
    }

    /// Bind `method` on `target`. The caller checks `responds_to` first.
    pub fn method(target: Arc<dyn MethodTarget>, method: impl Into<CompactString>) -> Self {
        let method: CompactString = method.into();
        let id = HandlerId::Method {
            target: Arc::as_ptr(&target).cast::<()>() as usize,
            method: method.clone(),
        };

        Self {
            id,
            callback: Arc::new(move |event: &Event| target.invoke(&method, event)),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &HandlerId {
        &self.id
    }

    pub fn call(&self, event: &Event) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

/// First element of a `[target, name]` pair.
#[derive(Clone)]
pub enum Target {
    Object(Arc<dyn MethodTarget>),
    Path(PathBuf),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// What a caller hands to `register`.
#[derive(Debug, Clone)]
pub enum HandlerSpec {
    /// Function resolvable in the global namespace.
    Named(CompactString),

    /// Object plus method name, or file path plus function name.
    Pair(Target, CompactString),

    /// Anonymous function.
    Closure(Handler),
}

impl HandlerSpec {
    pub fn named(name: impl Into<CompactString>) -> Self {
        Self::Named(name.into())
    }

    pub fn method(target: Arc<dyn MethodTarget>, method: impl Into<CompactString>) -> Self {
        Self::Pair(Target::Object(target), method.into())
    }

    pub fn file(path: impl Into<PathBuf>, function: impl Into<CompactString>) -> Self {
        Self::Pair(Target::Path(path.into()), function.into())
    }

    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Closure(Handler::closure(f))
    }
}

impl From<&str> for HandlerSpec {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for HandlerSpec {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<Handler> for HandlerSpec {
    fn from(handler: Handler) -> Self {
        Self::Closure(handler)
    }
}

/// Loosely-typed handler values, as they appear in configuration files.
///
/// A string is a function name, a two-element string array is
/// `[path, function]`; anything else is rejected.
impl TryFrom<&toml::Value> for HandlerSpec {
    type Error = DispatchError;

    fn try_from(value: &toml::Value) -> Result<Self, Self::Error> {
        match value {
            toml::Value::String(name) => Ok(Self::named(name.as_str())),
            toml::Value::Array(items) => match items.as_slice() {
                [toml::Value::String(path), toml::Value::String(function)] => {
                    Ok(Self::file(path, function.as_str()))
                }
                _ => Err(DispatchError::invalid_handler_type(format!(
                    "array of {} element(s)",
                    items.len()
                ))),
            },
            other => Err(DispatchError::invalid_handler_type(other.type_str())),
        }
    }
}

/// Where a new handler goes in its event's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    #[default]
    Append,

    /// Index 0, ahead of every handler already registered, earlier prepends included.
    Prepend,
}

/// A stored `(handler, default payload)` pair.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    handler: Handler,
    default_payload: Option<Payload>,
}

impl HandlerEntry {
    pub const fn new(handler: Handler, default_payload: Option<Payload>) -> Self {
        Self {
            handler,
            default_payload,
        }
    }

    #[must_use]
    pub const fn handler(&self) -> &Handler {
        &self.handler
    }

    #[must_use]
    pub const fn default_payload(&self) -> Option<&Payload> {
        self.default_payload.as_ref()
    }
}
