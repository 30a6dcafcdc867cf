//! Built-in modules
//!
//! The minimal module set a running core needs. External adapters (real
//! databases, Kafka/NATS clients, cloud SDKs) register through plugins
//! instead.

pub mod broker;
pub mod cache;
pub mod database;
pub mod dynamic;
pub mod event_processor;
pub mod http_handler;
pub mod http_router;
pub mod http_server;
pub mod scheduler;
pub mod statemachine;

pub use broker::*;
pub use cache::*;
pub use database::*;
pub use dynamic::*;
pub use event_processor::*;
pub use http_handler::*;
pub use http_router::*;
pub use http_server::*;
pub use scheduler::*;
pub use statemachine::*;

use crate::plugin::ModuleFactoryRegistry;

/// Register every built-in module type
pub fn register_builtins(registry: &mut ModuleFactoryRegistry) {
    http_server::register(registry);
    http_router::register(registry);
    http_handler::register(registry);
    broker::register(registry);
    statemachine::register(registry);
    scheduler::register(registry);
    cache::register(registry);
    database::register(registry);
    dynamic::register(registry);
    event_processor::register(registry);
}
