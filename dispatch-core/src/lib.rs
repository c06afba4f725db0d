pub mod error;

pub mod config;

pub mod event;
pub use event::{Event, Payload, WILDCARD};

pub mod handler;
pub use handler::{
    Handler, HandlerEntry, HandlerId, HandlerSpec, MethodTarget, Placement, Target,
};

pub mod functions;
pub use functions::FunctionTable;

pub mod loader;
pub use loader::{UnitCatalog, UnitLoader};

pub mod dispatcher;
pub use dispatcher::{Dispatcher, DispatcherBuilder, HandlerMap};

pub mod subscriber;
pub use subscriber::Subscriber;

pub mod logging;
pub use logging::LoggerBuilder;

pub use config::{Binding, DispatchConfig};
pub use error::{DispatchError, Result};
