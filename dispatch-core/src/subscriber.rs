use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// An object that registers its own batch of handlers.
///
/// [`Dispatcher::subscribe`] calls `subscribe` exactly once per call and
/// places no limit on what it registers. Taking `Arc<Self>` lets the
/// subscriber bind its own methods as handlers.
pub trait Subscriber: Send + Sync + 'static {
    fn subscribe(self: Arc<Self>, dispatcher: &Dispatcher) -> Result<()>;
}
