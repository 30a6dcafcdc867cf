//! Well-known service names
//!
//! Every module publishes exactly one canonical service under its module
//! name. The names below are reserved for engine-level services; they are a
//! documented convention, not a global registry.

/// Counter collector shared by the engine and the broker.
pub const METRICS_COLLECTOR: &str = "metrics.collector";

/// The engine itself, for modules that dispatch workflows.
pub const WORKFLOW_ENGINE: &str = "workflow-engine";

/// Secrets resolver used for config expansion.
pub const SECRETS_RESOLVER: &str = "secrets-resolver";

/// License validation hook.
pub const LICENSE_VALIDATOR: &str = "license-validator";

/// Distributed tracing hook.
pub const TRACER: &str = "tracer";
