//! Scheduler workflow handler
//!
//! Registers job modules with a named cron scheduler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};
use crate::modules::scheduler::{CronScheduler, Job};

#[derive(Debug, Clone, Deserialize)]
struct JobConfig {
    /// Scheduler module name
    scheduler: String,
    /// Job module name
    job: String,
    /// Cron spec with seconds, e.g. `"0 */5 * * * *"`
    schedule: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SchedulerWorkflowConfig {
    #[serde(default)]
    jobs: Vec<JobConfig>,
}

/// Handler for the `scheduler` workflow type
pub struct SchedulerWorkflowHandler {
    /// job module name → job, for direct `execute` invocations
    jobs: Mutex<HashMap<String, Arc<dyn Job>>>,
}

impl Default for SchedulerWorkflowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerWorkflowHandler {
    /// Create the handler
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WorkflowHandler for SchedulerWorkflowHandler {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "scheduler"
    }

    async fn configure(&self, ctx: &WireContext, config: &Value) -> Result<(), EngineError> {
        let config: SchedulerWorkflowConfig = serde_json::from_value(config.clone())
            .map_err(|err| EngineError::wiring("scheduler", err))?;

        for entry in &config.jobs {
            let scheduler: Arc<CronScheduler> =
                ctx.app.registry().get(&entry.scheduler).ok_or_else(|| {
                    EngineError::wiring(
                        "scheduler",
                        format!("unknown scheduler module '{}'", entry.scheduler),
                    )
                })?;
            let job: Arc<dyn Job> = ctx.app.registry().get(&entry.job).ok_or_else(|| {
                EngineError::wiring("scheduler", format!("unknown job module '{}'", entry.job))
            })?;

            scheduler
                .add_job(&entry.schedule, job.clone())
                .map_err(|err| EngineError::wiring("scheduler", err))?;

            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.insert(entry.job.clone(), job);
        }

        Ok(())
    }

    /// Direct invocation: `action` is a job module name; runs it now
    async fn execute(
        &self,
        _kind: &str,
        action: &str,
        _data: Value,
    ) -> Result<Value, WorkflowError> {
        let job = {
            let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.get(action).cloned()
        }
        .ok_or_else(|| WorkflowError::NotFound(format!("no job named '{action}'")))?;

        job.execute()
            .await
            .map_err(WorkflowError::Internal)?;
        Ok(serde_json::json!({"executed": true, "job": action}))
    }
}
