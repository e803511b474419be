//! Connection registry and fan-out dispatcher.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::RelayDispatcher;
pub use registry::{SessionEntry, SessionRegistry};
