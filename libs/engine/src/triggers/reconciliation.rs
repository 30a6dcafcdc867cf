//! `reconciliation` trigger - periodic tick for desired-state reconciliation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::engine::Dispatcher;
use crate::error::{EngineError, WorkflowError};
use crate::plugin::TriggerFactoryRegistry;
use crate::triggers::Trigger;

#[derive(Debug, Clone, Deserialize)]
struct ReconciliationTriggerConfig {
    /// Tick interval, e.g. `"30s"`
    interval: String,
    workflow: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

pub(crate) fn register(registry: &mut TriggerFactoryRegistry) {
    registry.register("reconciliation", |name, config, ctx| {
        let config: ReconciliationTriggerConfig = serde_json::from_value(config.config.clone())
            .map_err(|err| EngineError::factory(name, err))?;
        let interval = weft_config::parse_duration(&config.interval)
            .map_err(|err| EngineError::factory(name, err))?;

        Ok(Arc::new(ReconciliationTrigger {
            name: name.to_string(),
            interval,
            workflow: config.workflow,
            action: config.action.unwrap_or_else(|| "reconcile".to_string()),
            data: config.data.unwrap_or(Value::Null),
            dispatcher: ctx.dispatcher.clone(),
            cancel: CancellationToken::new(),
        }))
    });
}

/// Interval-driven dispatch trigger
pub struct ReconciliationTrigger {
    name: String,
    interval: Duration,
    workflow: String,
    action: String,
    data: Value,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

#[async_trait]
impl Trigger for ReconciliationTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "reconciliation"
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), EngineError> {
        let name = self.name.clone();
        let workflow = self.workflow.clone();
        let action = self.action.clone();
        let data = self.data.clone();
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the interval is
            // measured from start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                match dispatcher
                    .trigger_workflow(&workflow, &action, data.clone())
                    .await
                {
                    Ok(_) => {}
                    Err(WorkflowError::Cancelled) => return,
                    Err(err) => {
                        tracing::warn!(trigger = %name, error = %err, "reconciliation dispatch failed");
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        self.cancel.cancel();
        Ok(())
    }
}
