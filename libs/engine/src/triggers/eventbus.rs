//! `eventbus` trigger - subscription on the engine's own wired broker
//!
//! Like the `event` trigger, but bound to the native event bus rather than
//! a named broker module. Used for reacting to lifecycle topics such as
//! `workflow.failed`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use weft_broker::{FnHandler, InProcessBroker};

use crate::engine::Dispatcher;
use crate::error::EngineError;
use crate::plugin::TriggerFactoryRegistry;
use crate::triggers::Trigger;

#[derive(Debug, Clone, Deserialize)]
struct EventBusTriggerConfig {
    topic: String,
    workflow: String,
    #[serde(default)]
    action: Option<String>,
}

pub(crate) fn register(registry: &mut TriggerFactoryRegistry) {
    registry.register("eventbus", |name, config, ctx| {
        let config: EventBusTriggerConfig = serde_json::from_value(config.config.clone())
            .map_err(|err| EngineError::factory(name, err))?;

        let broker = ctx.broker.clone().ok_or_else(|| {
            EngineError::factory(name, "no broker wired; eventbus triggers need one")
        })?;

        Ok(Arc::new(EventBusTrigger {
            name: name.to_string(),
            broker,
            topic: config.topic,
            workflow: config.workflow,
            action: config.action.unwrap_or_default(),
            dispatcher: ctx.dispatcher.clone(),
            subscription: Mutex::new(None),
        }))
    });
}

/// Native event-bus subscription trigger
pub struct EventBusTrigger {
    name: String,
    broker: InProcessBroker,
    topic: String,
    workflow: String,
    action: String,
    dispatcher: Dispatcher,
    subscription: Mutex<Option<Uuid>>,
}

#[async_trait]
impl Trigger for EventBusTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "eventbus"
    }

    async fn start(&self, _shutdown: CancellationToken) -> Result<(), EngineError> {
        let name = self.name.clone();
        let workflow = self.workflow.clone();
        let action = self.action.clone();
        let dispatcher = self.dispatcher.clone();

        let id = self
            .broker
            .subscribe(
                &self.topic,
                Arc::new(FnHandler(move |_topic: String, payload: Vec<u8>| {
                    let name = name.clone();
                    let workflow = workflow.clone();
                    let action = action.clone();
                    let dispatcher = dispatcher.clone();
                    async move {
                        let data: Value =
                            serde_json::from_slice(&payload).unwrap_or(Value::Null);
                        if let Err(err) =
                            dispatcher.trigger_workflow(&workflow, &action, data).await
                        {
                            tracing::warn!(trigger = %name, error = %err, "eventbus dispatch failed");
                        }
                        Ok(())
                    }
                })),
            )
            .map_err(|err| EngineError::Trigger {
                trigger: self.name.clone(),
                message: err.to_string(),
            })?;

        let mut subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner());
        *subscription = Some(id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let id = {
            let mut subscription = self.subscription.lock().unwrap_or_else(|e| e.into_inner());
            subscription.take()
        };
        if let Some(id) = id {
            self.broker.unsubscribe_by_id(id);
        }
        Ok(())
    }
}
