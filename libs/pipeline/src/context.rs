//! Pipeline execution context
//!
//! The context carries the live payload (`data`), prior step outputs
//! (`steps`), optional HTTP request/response facets, and execution metadata.
//! It is also the template root: `{{ .field }}` selects from `data`,
//! `{{ .steps.<name>.<field> }}` from prior outputs.

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;

/// HTTP request facet for HTTP-originated pipelines
#[derive(Debug, Clone, Default)]
pub struct HttpRequestContext {
    /// Request method, uppercase
    pub method: String,

    /// Matched route path
    pub path: String,

    /// Path parameters from `{param}` placeholders
    pub path_params: Map<String, Value>,

    /// Query string parameters
    pub query: Map<String, Value>,

    /// Request headers
    pub headers: Map<String, Value>,

    /// Parsed request body
    pub body: Value,
}

/// HTTP response facet a terminal step may populate
#[derive(Debug, Clone)]
pub struct HttpResponseContext {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Execution identifiers
#[derive(Debug, Clone)]
pub struct ExecutionMetadata {
    /// Unique id for this pipeline execution
    pub execution_id: Uuid,

    /// Owning workflow, if dispatched through one
    pub workflow_id: Option<String>,

    /// Artifact store reference for CI steps
    pub artifact_store: Option<String>,
}

impl Default for ExecutionMetadata {
    fn default() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_id: None,
            artifact_store: None,
        }
    }
}

/// Mutable state shared by the steps of one execution
#[derive(Debug)]
pub struct PipelineContext {
    /// Live pipeline payload; also the template root
    pub data: Map<String, Value>,

    /// Prior step outputs, write-once per step name
    pub steps: Map<String, Value>,

    /// Request facet for HTTP-originated executions
    pub request: Option<HttpRequestContext>,

    /// Response facet populated by terminal steps
    pub response: Option<HttpResponseContext>,

    /// Execution identifiers
    pub metadata: ExecutionMetadata,

    /// Cooperative cancellation for I/O steps
    pub cancel: CancellationToken,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(Map::new())
    }
}

impl PipelineContext {
    /// Create a context seeded with `data`
    #[must_use]
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            steps: Map::new(),
            request: None,
            response: None,
            metadata: ExecutionMetadata::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a context from any JSON value
    ///
    /// Objects become the data map; other values land under `"input"`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        Self::new(data)
    }

    /// Attach a request facet
    #[must_use]
    pub fn with_request(mut self, request: HttpRequestContext) -> Self {
        self.request = Some(request);
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record a step's output; outputs are write-once
    pub fn record_step_output(&mut self, step: &str, output: Value) -> Result<(), PipelineError> {
        if self.steps.contains_key(step) {
            return Err(PipelineError::DuplicateStepOutput(step.to_string()));
        }
        self.steps.insert(step.to_string(), output);
        Ok(())
    }

    /// Merge an object into `data`, overwriting existing keys
    pub fn merge_data(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            self.data.insert(key.clone(), value.clone());
        }
    }

    /// Build the template root: data fields plus `steps`, `request`, and
    /// `metadata` projections
    #[must_use]
    pub fn template_root(&self) -> Value {
        let mut root = self.data.clone();
        root.insert("steps".to_string(), Value::Object(self.steps.clone()));

        if let Some(request) = &self.request {
            let mut req = Map::new();
            req.insert("method".to_string(), Value::String(request.method.clone()));
            req.insert("path".to_string(), Value::String(request.path.clone()));
            req.insert(
                "pathParams".to_string(),
                Value::Object(request.path_params.clone()),
            );
            req.insert("query".to_string(), Value::Object(request.query.clone()));
            req.insert(
                "headers".to_string(),
                Value::Object(request.headers.clone()),
            );
            req.insert("body".to_string(), request.body.clone());
            root.insert("request".to_string(), Value::Object(req));
        }

        let mut meta = Map::new();
        meta.insert(
            "executionId".to_string(),
            Value::String(self.metadata.execution_id.to_string()),
        );
        if let Some(workflow) = &self.metadata.workflow_id {
            meta.insert("workflowId".to_string(), Value::String(workflow.clone()));
        }
        root.insert("metadata".to_string(), Value::Object(meta));

        Value::Object(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_outputs_are_write_once() {
        let mut ctx = PipelineContext::default();
        ctx.record_step_output("fetch", json!({"status": 200}))
            .unwrap();

        let err = ctx
            .record_step_output("fetch", json!({"status": 500}))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStepOutput(_)));
        assert_eq!(ctx.steps["fetch"]["status"], 200);
    }

    #[test]
    fn test_template_root_exposes_data_and_steps() {
        let mut ctx = PipelineContext::from_value(json!({"order_id": "42"}));
        ctx.record_step_output("lookup", json!({"customer": "Alice"}))
            .unwrap();

        let root = ctx.template_root();
        assert_eq!(root["order_id"], "42");
        assert_eq!(root["steps"]["lookup"]["customer"], "Alice");
        assert!(root["metadata"]["executionId"].is_string());
    }

    #[test]
    fn test_from_value_wraps_non_objects() {
        let ctx = PipelineContext::from_value(json!([1, 2, 3]));
        assert_eq!(ctx.data["input"], json!([1, 2, 3]));
    }
}
