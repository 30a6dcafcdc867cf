//! `schedule` trigger - cron spec → workflow dispatch

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::engine::Dispatcher;
use crate::error::{EngineError, WorkflowError};
use crate::plugin::TriggerFactoryRegistry;
use crate::triggers::Trigger;

#[derive(Debug, Clone, Deserialize)]
struct ScheduleTriggerConfig {
    cron: String,
    workflow: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

pub(crate) fn register(registry: &mut TriggerFactoryRegistry) {
    registry.register("schedule", |name, config, ctx| {
        let config: ScheduleTriggerConfig = serde_json::from_value(config.config.clone())
            .map_err(|err| EngineError::factory(name, err))?;
        let schedule = Schedule::from_str(&config.cron)
            .map_err(|err| EngineError::factory(name, format!("bad cron spec '{}': {err}", config.cron)))?;

        Ok(Arc::new(ScheduleTrigger {
            name: name.to_string(),
            schedule,
            workflow: config.workflow,
            action: config.action.unwrap_or_default(),
            data: config.data.unwrap_or(Value::Null),
            dispatcher: ctx.dispatcher.clone(),
            cancel: CancellationToken::new(),
        }))
    });
}

/// Cron-driven dispatch trigger
pub struct ScheduleTrigger {
    name: String,
    schedule: Schedule,
    workflow: String,
    action: String,
    data: Value,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

#[async_trait]
impl Trigger for ScheduleTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "schedule"
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), EngineError> {
        let name = self.name.clone();
        let schedule = self.schedule.clone();
        let workflow = self.workflow.clone();
        let action = self.action.clone();
        let data = self.data.clone();
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    return;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();

                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(wait) => {}
                }

                match dispatcher
                    .trigger_workflow(&workflow, &action, data.clone())
                    .await
                {
                    Ok(_) => {}
                    // Cancellation during shutdown is expected, not retried.
                    Err(WorkflowError::Cancelled) => return,
                    Err(err) => {
                        tracing::warn!(trigger = %name, error = %err, "scheduled dispatch failed");
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
