//! Transition errors

use thiserror::Error;

/// Errors from state machine operations
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Instance id is not known
    #[error("State machine instance not found: {0}")]
    NotFound(String),

    /// Transition name is not declared by the definition
    #[error("Unknown transition: {0}")]
    UnknownTransition(String),

    /// Instance is not in the transition's from-state
    #[error("Transition '{transition}' requires state '{expected}' but instance is in '{actual}'")]
    InvalidFromState {
        transition: String,
        expected: String,
        actual: String,
    },

    /// Instance already reached a final state
    #[error("Instance '{id}' is in final state '{state}'")]
    FinalState { id: String, state: String },

    /// A guard rejected the transition
    #[error("Guard rejected transition '{0}'")]
    GuardRejected(String),

    /// The pre-transition hook failed; the transition was aborted
    #[error("Pre-transition hook failed: {0}")]
    HookFailed(String),

    /// Definition name is not registered
    #[error("Unknown state machine definition: {0}")]
    UnknownDefinition(String),

    /// Definition name is already registered
    #[error("State machine definition already registered: {0}")]
    DuplicateDefinition(String),

    /// Definition is structurally invalid
    #[error("Invalid definition '{name}': {message}")]
    InvalidDefinition { name: String, message: String },

    /// Instance id is already in use
    #[error("State machine instance already exists: {0}")]
    DuplicateInstance(String),
}
