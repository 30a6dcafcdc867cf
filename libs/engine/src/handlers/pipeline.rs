//! Pipeline workflow handler
//!
//! Handles workflow types of the form `pipeline:<name>`: seeds a context
//! with the invocation data, runs every step, and returns the final data.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_pipeline::{PipelineContext, PipelineRegistry};

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};

/// Handler for `pipeline:<name>` workflow types
pub struct PipelineWorkflowHandler {
    pipelines: Arc<PipelineRegistry>,
}

impl PipelineWorkflowHandler {
    /// Create the handler over the engine pipeline registry
    #[must_use]
    pub fn new(pipelines: Arc<PipelineRegistry>) -> Self {
        Self { pipelines }
    }
}

#[async_trait]
impl WorkflowHandler for PipelineWorkflowHandler {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind.starts_with("pipeline:")
    }

    async fn configure(&self, _ctx: &WireContext, _config: &Value) -> Result<(), EngineError> {
        // Pipelines are built and registered by the engine builder.
        Ok(())
    }

    async fn execute(
        &self,
        kind: &str,
        _action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let name = kind.strip_prefix("pipeline:").unwrap_or(kind);
        let pipeline = self
            .pipelines
            .get(name)
            .ok_or_else(|| WorkflowError::NotFound(format!("Unknown pipeline: {name}")))?;

        let mut ctx = PipelineContext::from_value(data);
        pipeline.execute(&mut ctx).await?;
        Ok(Value::Object(ctx.data))
    }
}
