//! State machine workflow handler
//!
//! Registers definitions with a named state machine engine and exposes
//! transitions (plus instance create/get) as workflow actions.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use weft_statemachine::{Definition, StateMachineEngine};

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateMachineWorkflowConfig {
    engine: String,
    #[serde(default)]
    definitions: Vec<Definition>,
    /// Publish `workflow.state.changed` to the engine's broker
    #[serde(default)]
    publish_state_changes: bool,
}

/// Handler for the `statemachine` workflow type
pub struct StateMachineWorkflowHandler {
    engine: Mutex<Option<Arc<StateMachineEngine>>>,
    /// First registered definition; the default for `create` actions
    default_definition: Mutex<Option<String>>,
}

impl Default for StateMachineWorkflowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachineWorkflowHandler {
    /// Create the handler
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: Mutex::new(None),
            default_definition: Mutex::new(None),
        }
    }

    fn engine(&self) -> Result<Arc<StateMachineEngine>, WorkflowError> {
        let engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        engine
            .clone()
            .ok_or_else(|| WorkflowError::Internal("statemachine workflow not configured".to_string()))
    }

    fn create_instance(&self, data: &Value) -> Result<Value, WorkflowError> {
        let engine = self.engine()?;

        let id = instance_id(data)
            .ok_or_else(|| WorkflowError::BadRequest("missing instance id".to_string()))?;
        let definition = match data.get("definition").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                let default = self
                    .default_definition
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                default.clone().ok_or_else(|| {
                    WorkflowError::BadRequest("missing 'definition' name".to_string())
                })?
            }
        };

        let seed = match data {
            Value::Object(fields) => {
                let mut seed = fields.clone();
                seed.remove("definition");
                seed
            }
            _ => Map::new(),
        };

        let instance = engine.create_instance(&definition, &id, seed)?;
        Ok(serde_json::json!({
            "id": instance.id,
            "state": instance.current_state,
            "success": true,
        }))
    }

    async fn get_instance(&self, data: &Value) -> Result<Value, WorkflowError> {
        let engine = self.engine()?;
        let id = instance_id(data)
            .ok_or_else(|| WorkflowError::BadRequest("missing instance id".to_string()))?;

        let instance = engine
            .instance(&id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(format!("State machine instance not found: {id}")))?;

        Ok(serde_json::json!({
            "id": instance.id,
            "state": instance.current_state,
            "data": Value::Object(instance.data),
            "success": true,
        }))
    }

    async fn run_transition(&self, action: &str, data: Value) -> Result<Value, WorkflowError> {
        let engine = self.engine()?;
        let id = instance_id(&data)
            .ok_or_else(|| WorkflowError::BadRequest("missing instance id".to_string()))?;

        let outcome = engine.transition(&id, action, data).await?;
        Ok(serde_json::json!({
            "id": outcome.instance.id,
            "state": outcome.to,
            "success": true,
        }))
    }
}

fn instance_id(data: &Value) -> Option<String> {
    data.get("instanceId")
        .or_else(|| data.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl WorkflowHandler for StateMachineWorkflowHandler {
    fn name(&self) -> &str {
        "statemachine"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "statemachine"
    }

    async fn configure(&self, ctx: &WireContext, config: &Value) -> Result<(), EngineError> {
        let config: StateMachineWorkflowConfig = serde_json::from_value(config.clone())
            .map_err(|err| EngineError::wiring("statemachine", err))?;

        let engine: Arc<StateMachineEngine> =
            ctx.app.registry().get(&config.engine).ok_or_else(|| {
                EngineError::wiring(
                    "statemachine",
                    format!("unknown state machine engine '{}'", config.engine),
                )
            })?;

        for definition in config.definitions {
            let name = definition.name.clone();
            engine
                .register_definition(definition)
                .map_err(|err| EngineError::wiring("statemachine", err))?;

            let mut default = self
                .default_definition
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            default.get_or_insert(name);
        }

        if config.publish_state_changes {
            if let Some(producer) = ctx.producer() {
                engine.bind_events(producer);
            }
        }

        let mut slot = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(engine);
        Ok(())
    }

    /// `action` is a transition name, or the reserved `create` / `get`
    ///
    /// Declared transitions shadow the reserved actions.
    async fn execute(
        &self,
        _kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let is_declared_transition = {
            let engine = self.engine()?;
            match instance_id(&data) {
                Some(id) => match engine.instance(&id).await {
                    Some(instance) => engine
                        .definition(&instance.definition)
                        .is_some_and(|definition| definition.transitions.contains_key(action)),
                    None => false,
                },
                None => false,
            }
        };

        if !is_declared_transition {
            match action {
                "create" => return self.create_instance(&data),
                "get" => return self.get_instance(&data).await,
                _ => {}
            }
        }

        self.run_transition(action, data).await
    }
}
