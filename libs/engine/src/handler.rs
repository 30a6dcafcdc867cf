//! Workflow handler capability set
//!
//! A handler claims a family of workflow types. The engine dispatches an
//! invocation by scanning handlers in registration order and calling the
//! first whose `can_handle` returns true.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_broker::{InProcessBroker, Producer};
use weft_core::Application;
use weft_pipeline::{PipelineRegistry, StepEnv, StepFactoryRegistry};

use crate::engine::Dispatcher;
use crate::error::{EngineError, WorkflowError};
use crate::metrics::MetricsCollector;

/// Everything a handler or trigger needs while wiring
#[derive(Clone)]
pub struct WireContext {
    /// Application whose registry holds the configured modules' services
    pub app: Arc<Application>,

    /// Engine pipeline registry
    pub pipelines: Arc<PipelineRegistry>,

    /// Step factories, for handlers that build inline pipelines
    pub step_factories: Arc<StepFactoryRegistry>,

    /// The engine's wired broker, if any
    pub broker: Option<InProcessBroker>,

    /// Shared counters
    pub metrics: Arc<MetricsCollector>,

    /// Dispatch entry for triggers
    pub dispatcher: Dispatcher,
}

impl WireContext {
    /// Publishing handle on the wired broker, if any
    #[must_use]
    pub fn producer(&self) -> Option<Producer> {
        self.broker.as_ref().map(InProcessBroker::producer)
    }

    /// Build environment for pipeline construction
    #[must_use]
    pub fn step_env(&self) -> StepEnv {
        StepEnv {
            app: self.app.clone(),
            pipelines: self.pipelines.clone(),
            producer: self.producer(),
            factories: self.step_factories.clone(),
        }
    }
}

/// A polymorphic dispatcher for one family of workflow types
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    /// Handler name, for logs
    fn name(&self) -> &str;

    /// Whether this handler claims `kind`
    fn can_handle(&self, kind: &str) -> bool;

    /// Wire the workflow config into the running graph
    async fn configure(&self, ctx: &WireContext, config: &Value) -> Result<(), EngineError>;

    /// Execute one invocation
    async fn execute(&self, kind: &str, action: &str, data: Value)
        -> Result<Value, WorkflowError>;
}
