//! Built-in step kinds
//!
//! Each step is config-driven; string leaves in step configs may carry
//! templates that render against the context at execution time.

pub mod ai;
pub mod artifact;
pub mod basic;
pub mod call;
pub mod conditional;
pub mod data;
pub mod http;
pub mod jq;
pub mod messaging;
pub mod validate;

pub use ai::*;
pub use artifact::*;
pub use basic::*;
pub use call::*;
pub use conditional::*;
pub use data::*;
pub use http::*;
pub use jq::*;
pub use messaging::*;
pub use validate::*;

use serde_json::Value;

use crate::error::PipelineError;
use crate::step::StepFactoryRegistry;

/// Register every built-in step kind
pub fn register_builtins(registry: &mut StepFactoryRegistry) {
    basic::register(registry);
    validate::register(registry);
    conditional::register(registry);
    jq::register(registry);
    http::register(registry);
    messaging::register(registry);
    call::register(registry);
    data::register(registry);
    ai::register(registry);
    artifact::register(registry);
}

// =============================================================================
// Config Helpers
// =============================================================================

/// Required string field of a step config
pub(crate) fn require_str(config: &Value, step: &str, field: &str) -> Result<String, PipelineError> {
    config
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PipelineError::config(step, format!("missing required field '{field}'")))
}

/// Optional string field of a step config
pub(crate) fn optional_str(config: &Value, field: &str) -> Option<String> {
    config.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Optional object field of a step config
pub(crate) fn optional_object(config: &Value, field: &str) -> serde_json::Map<String, Value> {
    config
        .get(field)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
