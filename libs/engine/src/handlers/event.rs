//! Event workflow handler
//!
//! Wires `{processor, patterns[], handlers[], adapters[]}`: patterns into a
//! named event processor, handler modules onto pattern ids, and broker
//! adapters that parse messages into events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use weft_broker::{FnHandler, InProcessBroker};

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};
use crate::modules::event_processor::{Event, EventPatternHandler, EventProcessor, PatternConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdapterConfig {
    /// Broker module name
    broker: String,
    topic: String,
    /// Field carrying the event type (default `"type"`)
    #[serde(default)]
    event_type_key: Option<String>,
    #[serde(default)]
    source_id_key: Option<String>,
    #[serde(default)]
    correl_id_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HandlerBinding {
    /// Pattern id
    pattern: String,
    /// Handler module name
    handler: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EventWorkflowConfig {
    processor: String,
    #[serde(default)]
    patterns: Vec<PatternConfig>,
    #[serde(default)]
    handlers: Vec<HandlerBinding>,
    #[serde(default)]
    adapters: Vec<AdapterConfig>,
}

/// Handler for the `event` workflow type
pub struct EventWorkflowHandler {
    processor: Mutex<Option<Arc<EventProcessor>>>,
}

impl Default for EventWorkflowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventWorkflowHandler {
    /// Create the handler
    #[must_use]
    pub fn new() -> Self {
        Self {
            processor: Mutex::new(None),
        }
    }
}

#[async_trait]
impl WorkflowHandler for EventWorkflowHandler {
    fn name(&self) -> &str {
        "event"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "event"
    }

    async fn configure(&self, ctx: &WireContext, config: &Value) -> Result<(), EngineError> {
        let config: EventWorkflowConfig = serde_json::from_value(config.clone())
            .map_err(|err| EngineError::wiring("event", err))?;

        let processor: Arc<EventProcessor> =
            ctx.app.registry().get(&config.processor).ok_or_else(|| {
                EngineError::wiring(
                    "event",
                    format!("unknown event processor '{}'", config.processor),
                )
            })?;

        for pattern in config.patterns {
            processor
                .add_pattern(pattern)
                .map_err(|err| EngineError::wiring("event", err))?;
        }

        for binding in &config.handlers {
            let handler: Arc<dyn EventPatternHandler> =
                ctx.app.registry().get(&binding.handler).ok_or_else(|| {
                    EngineError::wiring(
                        "event",
                        format!("unknown event handler module '{}'", binding.handler),
                    )
                })?;
            processor
                .bind_handler(&binding.pattern, handler)
                .map_err(|err| EngineError::wiring("event", err))?;
        }

        for adapter in &config.adapters {
            let broker: InProcessBroker =
                ctx.app.registry().get(&adapter.broker).ok_or_else(|| {
                    EngineError::wiring(
                        "event",
                        format!("unknown broker module '{}'", adapter.broker),
                    )
                })?;
            subscribe_adapter(&broker, adapter, processor.clone())
                .map_err(|err| EngineError::wiring("event", err))?;
        }

        let mut slot = self.processor.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(processor);
        Ok(())
    }

    /// Direct invocation: `action` is an event type; `data` the event body
    async fn execute(
        &self,
        _kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let processor = {
            let processor = self.processor.lock().unwrap_or_else(|e| e.into_inner());
            processor.clone()
        }
        .ok_or_else(|| WorkflowError::Internal("event workflow not configured".to_string()))?;

        processor
            .ingest(Event {
                event_type: action.to_string(),
                source_id: None,
                correlation_id: None,
                data,
                at: Utc::now(),
            })
            .await;

        Ok(serde_json::json!({"ingested": true, "eventType": action}))
    }
}

/// Bridge one broker topic into the processor
fn subscribe_adapter(
    broker: &InProcessBroker,
    adapter: &AdapterConfig,
    processor: Arc<EventProcessor>,
) -> Result<(), String> {
    let type_key = adapter
        .event_type_key
        .clone()
        .unwrap_or_else(|| "type".to_string());
    let source_key = adapter.source_id_key.clone();
    let correl_key = adapter.correl_id_key.clone();

    broker
        .subscribe(
            &adapter.topic,
            Arc::new(FnHandler(move |_topic: String, payload: Vec<u8>| {
                let processor = processor.clone();
                let type_key = type_key.clone();
                let source_key = source_key.clone();
                let correl_key = correl_key.clone();
                async move {
                    let Ok(parsed) = serde_json::from_slice::<Value>(&payload) else {
                        tracing::debug!("event adapter skipped non-JSON message");
                        return Ok(());
                    };
                    let Some(event_type) =
                        parsed.get(&type_key).and_then(Value::as_str).map(str::to_string)
                    else {
                        tracing::debug!(key = %type_key, "event adapter skipped untyped message");
                        return Ok(());
                    };

                    let field = |key: &Option<String>| {
                        key.as_ref()
                            .and_then(|k| parsed.get(k))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    };

                    processor
                        .ingest(Event {
                            event_type,
                            source_id: field(&source_key),
                            correlation_id: field(&correl_key),
                            data: parsed,
                            at: Utc::now(),
                        })
                        .await;
                    Ok(())
                }
            })),
        )
        .map_err(|err| err.to_string())?;
    Ok(())
}
