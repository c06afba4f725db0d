//! Event and payload values handed to handlers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;

/// Name under which wildcard handlers are registered.
pub const WILDCARD: &str = "*";

/// Opaque, shared payload. Cloning shares the underlying value.
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap a value the caller keeps a handle to.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// True if both payloads share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// Immutable value built once per handler invocation.
#[derive(Debug, Clone)]
pub struct Event {
    name: CompactString,
    data: Option<Payload>,
}

impl Event {
    pub fn new(name: impl Into<CompactString>, data: Option<Payload>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Payload downcast to `T`, if present and of that type.
    #[must_use]
    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data.as_ref().and_then(Payload::downcast_ref::<T>)
    }
}
