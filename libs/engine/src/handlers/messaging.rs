//! Messaging workflow handler
//!
//! Binds broker topics to message handler modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use weft_broker::{InProcessBroker, MessageHandler};

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionConfig {
    topic: String,
    /// Module name of a message handler service
    handler: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagingWorkflowConfig {
    broker: String,
    #[serde(default)]
    subscriptions: Vec<SubscriptionConfig>,
}

/// Handler for the `messaging` workflow type
pub struct MessagingWorkflowHandler {
    /// topic → handler, kept for direct `execute` invocations
    handlers: Mutex<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl Default for MessagingWorkflowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagingWorkflowHandler {
    /// Create the handler
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WorkflowHandler for MessagingWorkflowHandler {
    fn name(&self) -> &str {
        "messaging"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "messaging"
    }

    async fn configure(&self, ctx: &WireContext, config: &Value) -> Result<(), EngineError> {
        let config: MessagingWorkflowConfig = serde_json::from_value(config.clone())
            .map_err(|err| EngineError::wiring("messaging", err))?;

        let broker: InProcessBroker = ctx.app.registry().get(&config.broker).ok_or_else(|| {
            EngineError::wiring("messaging", format!("unknown broker module '{}'", config.broker))
        })?;

        for subscription in &config.subscriptions {
            let handler: Arc<dyn MessageHandler> = ctx
                .app
                .registry()
                .get(&subscription.handler)
                .ok_or_else(|| {
                    EngineError::wiring(
                        "messaging",
                        format!("unknown message handler module '{}'", subscription.handler),
                    )
                })?;

            broker
                .subscribe(&subscription.topic, handler.clone())
                .map_err(|err| EngineError::wiring("messaging", err))?;

            let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.insert(subscription.topic.clone(), handler);
        }

        Ok(())
    }

    /// Direct invocation: `action` is a subscribed topic, `data` the payload
    async fn execute(
        &self,
        _kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let handler = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.get(action).cloned()
        }
        .ok_or_else(|| WorkflowError::NotFound(format!("no subscription on topic '{action}'")))?;

        let payload =
            serde_json::to_vec(&data).map_err(|err| WorkflowError::Internal(err.to_string()))?;
        handler
            .handle(action, &payload)
            .await
            .map_err(|err| WorkflowError::Internal(err.to_string()))?;

        Ok(serde_json::json!({"delivered": true, "topic": action}))
    }
}
