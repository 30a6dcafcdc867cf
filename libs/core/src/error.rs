//! Lifecycle and registry errors

use thiserror::Error;

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the service registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A service is already bound under this name
    #[error("Service already registered: {0}")]
    Duplicate(String),

    /// The registry is sealed; writes after init are forbidden
    #[error("Registry is sealed; cannot register '{0}' after init")]
    Sealed(String),
}

// =============================================================================
// Lifecycle Errors
// =============================================================================

/// Errors from module lifecycle operations
///
/// Every variant that originates in a module retains the offending module
/// name.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Module init failed
    #[error("Module '{module}' init failed: {message}")]
    InitFailed { module: String, message: String },

    /// Module start failed
    #[error("Module '{module}' start failed: {message}")]
    StartFailed { module: String, message: String },

    /// Module stop failed
    #[error("Module '{module}' stop failed: {message}")]
    StopFailed { module: String, message: String },

    /// A service the module requires is not in the registry
    #[error("Module '{module}' requires missing service '{service}'")]
    MissingService { module: String, service: String },

    /// A module name is registered twice
    #[error("Duplicate module name: {0}")]
    DuplicateModule(String),

    /// The dependency graph contains a cycle
    #[error("Dependency cycle involving modules: {0}")]
    DependencyCycle(String),

    /// A dependency names a module that was never registered
    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    /// Registry failure during init
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Several stop failures collected into one error
    #[error("Stop failures: {}", .0.join("; "))]
    Composite(Vec<String>),
}

impl LifecycleError {
    /// Shorthand for an init failure with a formatted message
    pub fn init(module: impl Into<String>, message: impl ToString) -> Self {
        Self::InitFailed {
            module: module.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a start failure with a formatted message
    pub fn start(module: impl Into<String>, message: impl ToString) -> Self {
        Self::StartFailed {
            module: module.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a stop failure with a formatted message
    pub fn stop(module: impl Into<String>, message: impl ToString) -> Self {
        Self::StopFailed {
            module: module.into(),
            message: message.to_string(),
        }
    }
}
