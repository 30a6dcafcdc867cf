//! State machine instances

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An identified, stateful record advancing through a definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Externally assigned id
    pub id: String,

    /// Name of the owning definition
    pub definition: String,

    /// Current state; always one of the definition's states
    pub current_state: String,

    /// Arbitrary payload; transition payloads merge into this map
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// Create a fresh instance in the definition's initial state
    #[must_use]
    pub fn new(id: impl Into<String>, definition: impl Into<String>, initial_state: impl Into<String>, data: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            definition: definition.into(),
            current_state: initial_state.into(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge an object payload into the instance data
    pub fn merge_data(&mut self, payload: &Value) {
        if let Value::Object(fields) = payload {
            for (key, value) in fields {
                self.data.insert(key.clone(), value.clone());
            }
        }
    }
}
