//! Pipeline runtime for Weft
//!
//! Executes ordered, typed steps against a shared context with template
//! expansion, error strategies, and cross-pipeline calls.

pub mod context;
pub mod error;
pub mod executor;
pub mod registry;
pub mod services;
pub mod step;
pub mod steps;
pub mod template;

pub use context::*;
pub use error::*;
pub use executor::*;
pub use registry::*;
pub use services::*;
pub use step::*;
pub use template::*;
