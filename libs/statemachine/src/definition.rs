//! State machine definitions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// One state within a definition
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateDef {
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// No transition may leave a final state
    #[serde(default)]
    pub is_final: bool,

    /// Marks failure terminals for reporting
    #[serde(default)]
    pub is_error: bool,
}

/// One named transition within a definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDef {
    /// State the instance must currently be in
    pub from_state: String,

    /// State the instance moves to
    pub to_state: String,
}

/// A named state machine definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    /// Definition name, unique within the engine
    pub name: String,

    /// State every new instance starts in
    pub initial_state: String,

    /// Mapping state-name → state
    pub states: BTreeMap<String, StateDef>,

    /// Mapping transition-name → transition
    #[serde(default)]
    pub transitions: BTreeMap<String, TransitionDef>,
}

impl Definition {
    /// Check structural invariants: the initial state exists and every
    /// transition references declared states.
    pub fn validate(&self) -> Result<(), TransitionError> {
        let invalid = |message: String| TransitionError::InvalidDefinition {
            name: self.name.clone(),
            message,
        };

        if !self.states.contains_key(&self.initial_state) {
            return Err(invalid(format!(
                "initial state '{}' is not declared",
                self.initial_state
            )));
        }

        for (name, transition) in &self.transitions {
            if !self.states.contains_key(&transition.from_state) {
                return Err(invalid(format!(
                    "transition '{name}' leaves unknown state '{}'",
                    transition.from_state
                )));
            }
            if !self.states.contains_key(&transition.to_state) {
                return Err(invalid(format!(
                    "transition '{name}' enters unknown state '{}'",
                    transition.to_state
                )));
            }
        }

        Ok(())
    }

    /// Whether `state` is declared final
    #[must_use]
    pub fn is_final_state(&self, state: &str) -> bool {
        self.states.get(state).is_some_and(|s| s.is_final)
    }
}
