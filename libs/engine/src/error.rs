//! Engine build and dispatch errors

use thiserror::Error;

use weft_config::ValidationReport;

/// Fatal errors while turning a config into a running engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Config could not be loaded or merged
    #[error(transparent)]
    Config(#[from] weft_config::ConfigError),

    /// Config failed schema validation
    #[error("Config validation failed: {0}")]
    Validation(ValidationReport),

    /// No module factory registered for a declared type
    #[error("Unknown module type: {0}")]
    UnknownModuleType(String),

    /// No trigger factory registered for a declared type
    #[error("Unknown trigger type: {0}")]
    UnknownTriggerType(String),

    /// No workflow handler claims a declared workflow type
    #[error("No handler for workflow type: {0}")]
    UnknownWorkflowType(String),

    /// A factory rejected its config
    #[error("Factory for '{name}' failed: {message}")]
    Factory { name: String, message: String },

    /// Handler wiring failed
    #[error("Failed to configure workflow '{workflow}': {message}")]
    Wiring { workflow: String, message: String },

    /// Module lifecycle failure
    #[error(transparent)]
    Lifecycle(#[from] weft_core::LifecycleError),

    /// Pipeline build failure
    #[error(transparent)]
    Pipeline(#[from] weft_pipeline::PipelineError),

    /// Trigger start/stop failure
    #[error("Trigger '{trigger}' failed: {message}")]
    Trigger { trigger: String, message: String },
}

impl EngineError {
    /// Shorthand for factory failures
    pub fn factory(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Factory {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for wiring failures
    pub fn wiring(workflow: impl Into<String>, message: impl ToString) -> Self {
        Self::Wiring {
            workflow: workflow.into(),
            message: message.to_string(),
        }
    }
}

/// Runtime dispatch errors, classified for HTTP mapping
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Unknown resource or unclaimed workflow type → 404
    #[error("{0}")]
    NotFound(String),

    /// Invalid request or inadmissible transition → 400
    #[error("{0}")]
    BadRequest(String),

    /// Cancelled by shutdown
    #[error("Execution cancelled")]
    Cancelled,

    /// Anything else → 500 with a generic message
    #[error("{0}")]
    Internal(String),
}

impl From<weft_statemachine::TransitionError> for WorkflowError {
    fn from(err: weft_statemachine::TransitionError) -> Self {
        use weft_statemachine::TransitionError as E;
        match err {
            E::NotFound(_) => Self::NotFound(err.to_string()),
            E::UnknownTransition(_)
            | E::InvalidFromState { .. }
            | E::FinalState { .. }
            | E::GuardRejected(_)
            | E::DuplicateInstance(_) => Self::BadRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<weft_pipeline::PipelineError> for WorkflowError {
    fn from(err: weft_pipeline::PipelineError) -> Self {
        match err {
            weft_pipeline::PipelineError::UnknownPipeline(name) => {
                Self::NotFound(format!("Unknown pipeline: {name}"))
            }
            weft_pipeline::PipelineError::Validation(message) => Self::BadRequest(message),
            weft_pipeline::PipelineError::Cancelled => Self::Cancelled,
            other => Self::Internal(other.to_string()),
        }
    }
}
