//! Weft engine
//!
//! Turns a declarative `WorkflowConfig` into a running system: modules are
//! built and initialized in dependency order, workflow handlers wire routes,
//! subscriptions, state machines, jobs, and pipelines, and triggers convert
//! external stimuli into workflow dispatches.

pub mod builder;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod handlers;
pub mod metrics;
pub mod modules;
pub mod plugin;
pub mod triggers;

pub use builder::*;
pub use dynamic::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use handler::*;
pub use handlers::*;
pub use metrics::*;
pub use modules::*;
pub use plugin::*;
