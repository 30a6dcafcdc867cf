//! State machine engine
//!
//! Registers definitions, owns the in-memory instance table, and serializes
//! transitions per instance while allowing parallelism across instances.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use weft_broker::Producer;

use crate::definition::Definition;
use crate::error::TransitionError;
use crate::hooks::{TransitionGuard, TransitionHook};
use crate::instance::Instance;

/// Topic for committed transition events
pub const STATE_CHANGED_TOPIC: &str = "workflow.state.changed";

/// Outcome of a committed transition
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// Transition name that fired
    pub transition: String,

    /// State before the transition
    pub from: String,

    /// State after the transition
    pub to: String,

    /// Snapshot of the instance after commit
    pub instance: Instance,
}

type GuardKey = (String, String);

/// Engine managing definitions and instances
#[derive(Default)]
pub struct StateMachineEngine {
    definitions: RwLock<HashMap<String, Arc<Definition>>>,
    /// Per-instance mutex yields strict serial transitions per instance
    instances: RwLock<HashMap<String, Arc<Mutex<Instance>>>>,
    guards: RwLock<HashMap<GuardKey, Arc<dyn TransitionGuard>>>,
    hooks: RwLock<HashMap<GuardKey, Arc<dyn TransitionHook>>>,
    events: RwLock<Option<Producer>>,
}

impl StateMachineEngine {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `workflow.state.changed` events to this producer
    pub fn bind_events(&self, producer: Producer) {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        *events = Some(producer);
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Register a definition. Names are unique; re-registration fails.
    pub fn register_definition(&self, definition: Definition) -> Result<(), TransitionError> {
        definition.validate()?;
        let mut definitions = self.definitions.write().unwrap_or_else(|e| e.into_inner());
        if definitions.contains_key(&definition.name) {
            return Err(TransitionError::DuplicateDefinition(definition.name));
        }
        definitions.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Look up a definition by name
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<Arc<Definition>> {
        let definitions = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        definitions.get(name).cloned()
    }

    /// Attach a guard to one transition of one definition
    pub fn set_guard(
        &self,
        definition: &str,
        transition: &str,
        guard: Arc<dyn TransitionGuard>,
    ) {
        let mut guards = self.guards.write().unwrap_or_else(|e| e.into_inner());
        guards.insert((definition.to_string(), transition.to_string()), guard);
    }

    /// Attach hooks to one transition of one definition
    pub fn set_hook(&self, definition: &str, transition: &str, hook: Arc<dyn TransitionHook>) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.insert((definition.to_string(), transition.to_string()), hook);
    }

    // =========================================================================
    // Instances
    // =========================================================================

    /// Create an instance with an externally assigned id
    pub fn create_instance(
        &self,
        definition_name: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Instance, TransitionError> {
        let definition = self
            .definition(definition_name)
            .ok_or_else(|| TransitionError::UnknownDefinition(definition_name.to_string()))?;

        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        if instances.contains_key(id) {
            return Err(TransitionError::DuplicateInstance(id.to_string()));
        }

        let instance = Instance::new(id, definition_name, definition.initial_state.clone(), data);
        instances.insert(id.to_string(), Arc::new(Mutex::new(instance.clone())));
        Ok(instance)
    }

    /// Snapshot an instance by id
    pub async fn instance(&self, id: &str) -> Option<Instance> {
        let cell = {
            let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
            instances.get(id).cloned()
        }?;
        let instance = cell.lock().await.clone();
        Some(instance)
    }

    /// Snapshot every instance of one definition
    pub async fn instances_for(&self, definition: &str) -> Vec<Instance> {
        let cells: Vec<Arc<Mutex<Instance>>> = {
            let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
            instances.values().cloned().collect()
        };

        let mut snapshots = Vec::new();
        for cell in cells {
            let instance = cell.lock().await.clone();
            if instance.definition == definition {
                snapshots.push(instance);
            }
        }
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Remove an instance; returns whether it existed
    pub fn remove_instance(&self, id: &str) -> bool {
        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        instances.remove(id).is_some()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Attempt a named transition on an instance
    ///
    /// Holds the instance's mutex for the whole attempt, so transitions on
    /// one instance are strictly serial. Commit happens after the pre-hook,
    /// making the transition all-or-nothing.
    pub async fn transition(
        &self,
        instance_id: &str,
        transition_name: &str,
        payload: Value,
    ) -> Result<TransitionOutcome, TransitionError> {
        let cell = {
            let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
            instances.get(instance_id).cloned()
        }
        .ok_or_else(|| TransitionError::NotFound(instance_id.to_string()))?;

        let mut instance = cell.lock().await;

        let definition = self
            .definition(&instance.definition)
            .ok_or_else(|| TransitionError::UnknownDefinition(instance.definition.clone()))?;

        let transition = definition
            .transitions
            .get(transition_name)
            .ok_or_else(|| TransitionError::UnknownTransition(transition_name.to_string()))?;

        if transition.from_state != instance.current_state {
            return Err(TransitionError::InvalidFromState {
                transition: transition_name.to_string(),
                expected: transition.from_state.clone(),
                actual: instance.current_state.clone(),
            });
        }

        if definition.is_final_state(&instance.current_state) {
            return Err(TransitionError::FinalState {
                id: instance.id.clone(),
                state: instance.current_state.clone(),
            });
        }

        let key = (instance.definition.clone(), transition_name.to_string());

        let guard = {
            let guards = self.guards.read().unwrap_or_else(|e| e.into_inner());
            guards.get(&key).cloned()
        };
        if let Some(guard) = guard {
            let allowed = guard
                .check(&instance, &payload)
                .await
                .map_err(TransitionError::HookFailed)?;
            if !allowed {
                return Err(TransitionError::GuardRejected(transition_name.to_string()));
            }
        }

        let hook = {
            let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
            hooks.get(&key).cloned()
        };
        if let Some(hook) = &hook {
            hook.before(&instance, &payload)
                .await
                .map_err(TransitionError::HookFailed)?;
        }

        let from = instance.current_state.clone();
        instance.current_state = transition.to_state.clone();
        instance.updated_at = Utc::now();
        instance.merge_data(&payload);

        if let Some(hook) = &hook {
            if let Err(err) = hook.after(&instance, &payload).await {
                tracing::warn!(
                    instance = %instance.id,
                    transition = transition_name,
                    error = %err,
                    "post-transition hook failed; transition committed"
                );
            }
        }

        let outcome = TransitionOutcome {
            transition: transition_name.to_string(),
            from,
            to: instance.current_state.clone(),
            instance: instance.clone(),
        };
        drop(instance);

        self.publish_state_changed(&outcome);
        Ok(outcome)
    }

    fn publish_state_changed(&self, outcome: &TransitionOutcome) {
        let producer = {
            let events = self.events.read().unwrap_or_else(|e| e.into_inner());
            events.clone()
        };
        let Some(producer) = producer else { return };

        let event = serde_json::json!({
            "instanceId": outcome.instance.id,
            "definition": outcome.instance.definition,
            "transition": outcome.transition,
            "from": outcome.from,
            "to": outcome.to,
        });
        if let Err(err) = producer.send_message(STATE_CHANGED_TOPIC, event.to_string().as_bytes())
        {
            tracing::warn!(error = %err, "failed to publish state change event");
        }
    }
}

impl std::fmt::Debug for StateMachineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let definitions = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("StateMachineEngine")
            .field("definitions", &definitions.len())
            .field("instances", &instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::TransitionDef;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn order_definition() -> Definition {
        serde_json::from_value(serde_json::json!({
            "name": "order",
            "initialState": "received",
            "states": {
                "received": {},
                "validated": {},
                "stored": {},
                "notified": {"isFinal": true},
                "failed": {"isFinal": true, "isError": true}
            },
            "transitions": {
                "validate": {"fromState": "received", "toState": "validated"},
                "store": {"fromState": "validated", "toState": "stored"},
                "notify": {"fromState": "stored", "toState": "notified"},
                "fail_validation": {"fromState": "received", "toState": "failed"}
            }
        }))
        .unwrap()
    }

    fn engine_with_order() -> StateMachineEngine {
        let engine = StateMachineEngine::new();
        engine.register_definition(order_definition()).unwrap();
        engine
    }

    #[tokio::test]
    async fn test_full_walk_to_final_state() {
        let engine = engine_with_order();
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        for transition in ["validate", "store", "notify"] {
            engine
                .transition("ORD-001", transition, Value::Null)
                .await
                .unwrap();
        }

        let instance = engine.instance("ORD-001").await.unwrap();
        assert_eq!(instance.current_state, "notified");
    }

    #[tokio::test]
    async fn test_final_state_rejects_further_transitions() {
        // "retry" leaves the final state itself, so the from-state check
        // passes and the final-state check is what rejects it.
        let mut definition = order_definition();
        definition.transitions.insert(
            "retry".to_string(),
            TransitionDef {
                from_state: "failed".to_string(),
                to_state: "received".to_string(),
            },
        );
        let engine = StateMachineEngine::new();
        engine.register_definition(definition).unwrap();
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();
        engine
            .transition("ORD-001", "fail_validation", Value::Null)
            .await
            .unwrap();

        let err = engine
            .transition("ORD-001", "retry", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::FinalState { .. }));

        // A transition declared from a different state fails the from-state
        // check before the final-state check is reached.
        let err = engine
            .transition("ORD-001", "fail_validation", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidFromState { .. }));

        // Instance unchanged either way.
        let instance = engine.instance("ORD-001").await.unwrap();
        assert_eq!(instance.current_state, "failed");
    }

    #[tokio::test]
    async fn test_unknown_transition_mentions_name() {
        let engine = engine_with_order();
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        let err = engine
            .transition("ORD-001", "launch", Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("launch"));
    }

    #[tokio::test]
    async fn test_invalid_from_state() {
        let engine = engine_with_order();
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        let err = engine
            .transition("ORD-001", "store", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidFromState { .. }));
    }

    #[tokio::test]
    async fn test_missing_instance() {
        let engine = engine_with_order();
        let err = engine
            .transition("ghost", "validate", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound(_)));
    }

    struct RejectingGuard;

    #[async_trait]
    impl TransitionGuard for RejectingGuard {
        async fn check(&self, _instance: &Instance, _payload: &Value) -> Result<bool, String> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_guard_rejection_leaves_state() {
        let engine = engine_with_order();
        engine.set_guard("order", "validate", Arc::new(RejectingGuard));
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        let err = engine
            .transition("ORD-001", "validate", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::GuardRejected(_)));
        let instance = engine.instance("ORD-001").await.unwrap();
        assert_eq!(instance.current_state, "received");
    }

    struct FailingHook {
        fail_before: AtomicBool,
        after_calls: AtomicU32,
    }

    #[async_trait]
    impl TransitionHook for FailingHook {
        async fn before(&self, _instance: &Instance, _payload: &Value) -> Result<(), String> {
            if self.fail_before.load(Ordering::Relaxed) {
                Err("pre-hook refused".to_string())
            } else {
                Ok(())
            }
        }

        async fn after(&self, _instance: &Instance, _payload: &Value) -> Result<(), String> {
            self.after_calls.fetch_add(1, Ordering::Relaxed);
            Err("post-hook grumbled".to_string())
        }
    }

    #[tokio::test]
    async fn test_pre_hook_failure_aborts() {
        let engine = engine_with_order();
        let hook = Arc::new(FailingHook {
            fail_before: AtomicBool::new(true),
            after_calls: AtomicU32::new(0),
        });
        engine.set_hook("order", "validate", hook.clone());
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        let err = engine
            .transition("ORD-001", "validate", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::HookFailed(_)));
        let instance = engine.instance("ORD-001").await.unwrap();
        assert_eq!(instance.current_state, "received");
        assert_eq!(hook.after_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_post_hook_failure_commits_anyway() {
        let engine = engine_with_order();
        let hook = Arc::new(FailingHook {
            fail_before: AtomicBool::new(false),
            after_calls: AtomicU32::new(0),
        });
        engine.set_hook("order", "validate", hook.clone());
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        let outcome = engine
            .transition("ORD-001", "validate", Value::Null)
            .await
            .unwrap();
        assert_eq!(outcome.to, "validated");
        assert_eq!(hook.after_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_payload_merges_into_data() {
        let engine = engine_with_order();
        let mut seed = Map::new();
        seed.insert("customer".to_string(), serde_json::json!("Alice"));
        engine.create_instance("order", "ORD-001", seed).unwrap();

        engine
            .transition(
                "ORD-001",
                "validate",
                serde_json::json!({"validator": "bob"}),
            )
            .await
            .unwrap();

        let instance = engine.instance("ORD-001").await.unwrap();
        assert_eq!(instance.data["customer"], "Alice");
        assert_eq!(instance.data["validator"], "bob");
    }

    #[tokio::test]
    async fn test_concurrent_transitions_serialize_per_instance() {
        let engine = Arc::new(engine_with_order());
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.transition("ORD-001", "validate", Value::Null).await
            }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        // Exactly one attempt can leave "received".
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_state_change_event_published() {
        let broker = weft_broker::InProcessBroker::new();
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = received.clone();
        broker
            .subscribe(
                STATE_CHANGED_TOPIC,
                Arc::new(weft_broker::FnHandler(move |_t, payload: Vec<u8>| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(payload);
                        Ok(())
                    }
                })),
            )
            .unwrap();

        let engine = engine_with_order();
        engine.bind_events(broker.producer());
        engine
            .create_instance("order", "ORD-001", Map::new())
            .unwrap();
        engine
            .transition("ORD-001", "validate", Value::Null)
            .await
            .unwrap();

        let mut seen = false;
        for _ in 0..40 {
            if !received.lock().unwrap().is_empty() {
                seen = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(seen, "state change event not delivered");

        let payload = received.lock().unwrap()[0].clone();
        let event: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(event["to"], "validated");
    }
}
