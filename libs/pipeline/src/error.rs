//! Pipeline runtime errors

use thiserror::Error;

/// Template evaluation errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Malformed template text
    #[error("Template parse error: {0}")]
    Parse(String),

    /// Function name not in the closed table
    #[error("Unknown template function: {0}")]
    UnknownFunction(String),

    /// Wrong argument count for a function
    #[error("Function '{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    /// Value had the wrong shape for an operation
    #[error("Template type error: {0}")]
    Type(String),
}

/// Errors from building and executing pipelines
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step returned an error
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Template expansion failed
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Step outputs are write-once within an execution
    #[error("Step '{0}' already produced output")]
    DuplicateStepOutput(String),

    /// Step names are unique within a pipeline
    #[error("Duplicate step name '{step}' in pipeline '{pipeline}'")]
    DuplicateStepName { pipeline: String, step: String },

    /// No factory registered for the step type
    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    /// `step.workflow_call` target missing from the registry
    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    /// Pipeline name already registered
    #[error("Pipeline '{0}' already registered")]
    DuplicatePipeline(String),

    /// The pipeline registry is read-only after build
    #[error("Pipeline registry is frozen")]
    RegistryFrozen,

    /// Step config was structurally invalid at build time
    #[error("Step '{step}' misconfigured: {message}")]
    Configuration { step: String, message: String },

    /// Input validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A service a step requires is not registered
    #[error("Required service '{service}' not found")]
    MissingService { service: String },

    /// Context was cancelled
    #[error("Execution cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Shorthand for a build-time configuration error
    pub fn config(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a runtime step failure
    pub fn step(step: impl Into<String>, message: impl ToString) -> Self {
        Self::StepFailed {
            step: step.into(),
            message: message.to_string(),
        }
    }
}
