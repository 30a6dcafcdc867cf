//! Core runtime for Weft
//!
//! Provides the module lifecycle, the typed service registry, and the
//! application container that owns dependency-ordered init/start/stop.

pub mod application;
pub mod error;
pub mod module;
pub mod registry;
pub mod services;

pub use application::*;
pub use error::*;
pub use module::*;
pub use registry::*;
