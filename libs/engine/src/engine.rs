//! The running engine
//!
//! Owns the application, the configured workflow handlers, the active
//! trigger set, and the pipeline registry. `trigger_workflow` is the single
//! dispatch entry every trigger funnels through.

use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use weft_broker::Producer;
use weft_config::WorkflowConfig;
use weft_core::Application;
use weft_pipeline::PipelineRegistry;

use crate::error::{EngineError, WorkflowError};
use crate::events::{
    publish_lifecycle, WORKFLOW_COMPLETED_TOPIC, WORKFLOW_FAILED_TOPIC, WORKFLOW_STARTED_TOPIC,
};
use crate::handler::WorkflowHandler;
use crate::metrics::MetricsCollector;
use crate::triggers::Trigger;

/// Engine run state, surfaced by the management API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Built,
    Running,
    Stopped,
}

impl EngineStatus {
    /// Lowercase label for status payloads
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

pub(crate) struct EngineInner {
    pub(crate) app: Arc<Application>,
    pub(crate) handlers: RwLock<Vec<Arc<dyn WorkflowHandler>>>,
    pub(crate) triggers: RwLock<Vec<Arc<dyn Trigger>>>,
    pub(crate) pipelines: Arc<PipelineRegistry>,
    pub(crate) producer: Option<Producer>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) config: RwLock<WorkflowConfig>,
    pub(crate) status: RwLock<EngineStatus>,
    pub(crate) shutdown: CancellationToken,
}

/// A built engine
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// The hosting application
    #[must_use]
    pub fn app(&self) -> Arc<Application> {
        self.inner.app.clone()
    }

    /// The engine pipeline registry
    #[must_use]
    pub fn pipelines(&self) -> Arc<PipelineRegistry> {
        self.inner.pipelines.clone()
    }

    /// Shared counters
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.inner.metrics.clone()
    }

    /// Snapshot of the config this engine was built from
    #[must_use]
    pub fn config(&self) -> WorkflowConfig {
        let config = self.inner.config.read().unwrap_or_else(|e| e.into_inner());
        config.clone()
    }

    /// Current run state
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let status = self.inner.status.read().unwrap_or_else(|e| e.into_inner());
        *status
    }

    /// Dispatch handle for triggers and hosts
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Start modules in topological order, then all triggers
    ///
    /// A failure is a partial failure: everything already started is
    /// stopped before the error returns.
    pub async fn start(&self) -> Result<(), EngineError> {
        let shutdown = self.inner.shutdown.clone();
        self.inner.app.start_all(shutdown.clone()).await?;

        let triggers = {
            let triggers = self.inner.triggers.read().unwrap_or_else(|e| e.into_inner());
            triggers.clone()
        };
        for trigger in &triggers {
            if let Err(err) = trigger.start(shutdown.clone()).await {
                tracing::error!(trigger = trigger.name(), error = %err, "trigger start failed; rolling back");
                let _ = self.stop().await;
                return Err(err);
            }
        }

        self.set_status(EngineStatus::Running);
        tracing::info!(
            modules = self.inner.app.module_count(),
            triggers = triggers.len(),
            "engine started"
        );
        Ok(())
    }

    /// Stop triggers first (best-effort), then modules in reverse order
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.inner.shutdown.cancel();

        let triggers = {
            let triggers = self.inner.triggers.read().unwrap_or_else(|e| e.into_inner());
            triggers.clone()
        };

        let mut failures = Vec::new();
        for trigger in triggers.iter().rev() {
            if let Err(err) = trigger.stop().await {
                tracing::warn!(trigger = trigger.name(), error = %err, "trigger stop failed");
                failures.push(err.to_string());
            }
        }

        let shutdown = self.inner.shutdown.clone();
        if let Err(err) = self.inner.app.stop_all(shutdown).await {
            failures.push(err.to_string());
        }

        self.set_status(EngineStatus::Stopped);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Lifecycle(weft_core::LifecycleError::Composite(
                failures,
            )))
        }
    }

    /// Dispatch one workflow invocation
    pub async fn trigger_workflow(
        &self,
        kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        dispatch(&self.inner, kind, action, data).await
    }

    fn set_status(&self, status: EngineStatus) {
        let mut current = self.inner.status.write().unwrap_or_else(|e| e.into_inner());
        *current = status;
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("status", &self.status())
            .field("modules", &self.inner.app.module_count())
            .finish()
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Cheap, weak handle for calling into the engine
///
/// Triggers hold dispatchers rather than the engine itself so a torn-down
/// engine cannot be kept alive by its own trigger tasks.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Weak<EngineInner>,
}

impl Dispatcher {
    /// Dispatch handle that always reports shutdown; placeholder for wiring
    #[must_use]
    pub fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    /// Dispatch one workflow invocation
    pub async fn trigger_workflow(
        &self,
        kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(WorkflowError::Cancelled);
        };
        dispatch(&inner, kind, action, data).await
    }
}

pub(crate) fn make_engine(inner: Arc<EngineInner>) -> Engine {
    Engine { inner }
}

// =============================================================================
// Dispatch
// =============================================================================

async fn dispatch(
    inner: &Arc<EngineInner>,
    kind: &str,
    action: &str,
    data: Value,
) -> Result<Value, WorkflowError> {
    let execution_id = Uuid::new_v4();
    let started = serde_json::json!({
        "executionId": execution_id,
        "workflowType": kind,
        "action": action,
    });
    publish_lifecycle(inner.producer.as_ref(), WORKFLOW_STARTED_TOPIC, &started);
    inner.metrics.incr("workflow.started");

    let handler = {
        let handlers = inner.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.iter().find(|h| h.can_handle(kind)).cloned()
    };
    let Some(handler) = handler else {
        let err = WorkflowError::NotFound(format!("no handler for workflow type '{kind}'"));
        publish_failure(inner, &execution_id, kind, action, &err);
        return Err(err);
    };

    match handler.execute(kind, action, data).await {
        Ok(result) => {
            let completed = serde_json::json!({
                "executionId": execution_id,
                "workflowType": kind,
                "action": action,
            });
            publish_lifecycle(inner.producer.as_ref(), WORKFLOW_COMPLETED_TOPIC, &completed);
            inner.metrics.incr("workflow.completed");
            Ok(result)
        }
        Err(err) => {
            publish_failure(inner, &execution_id, kind, action, &err);
            Err(err)
        }
    }
}

fn publish_failure(
    inner: &Arc<EngineInner>,
    execution_id: &Uuid,
    kind: &str,
    action: &str,
    err: &WorkflowError,
) {
    let failed = serde_json::json!({
        "executionId": execution_id,
        "workflowType": kind,
        "action": action,
        "error": err.to_string(),
    });
    publish_lifecycle(inner.producer.as_ref(), WORKFLOW_FAILED_TOPIC, &failed);
    inner.metrics.incr("workflow.failed");
}
