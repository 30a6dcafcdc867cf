//! `step.delegate` and `step.workflow_call`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::registry::PipelineRegistry;
use crate::services::ServiceDelegate;
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::{optional_object, optional_str, require_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.delegate", |config, env| {
        let service_name = require_str(&config.config, &config.name, "service")?;
        let service: Arc<dyn ServiceDelegate> = env.require(&service_name)?;

        Ok(Arc::new(DelegateStep {
            name: config.name.clone(),
            service,
            action: require_str(&config.config, &config.name, "action")?,
            input: config.config.get("input").cloned(),
            target: optional_str(&config.config, "target"),
        }))
    });

    registry.register("step.workflow_call", |config, env| {
        let mode = optional_str(&config.config, "mode").unwrap_or_else(|| "sync".to_string());
        if mode != "sync" {
            return Err(PipelineError::config(
                &config.name,
                format!("unsupported mode '{mode}'; only 'sync' is supported"),
            ));
        }

        Ok(Arc::new(WorkflowCallStep {
            name: config.name.clone(),
            pipelines: env.pipelines.clone(),
            target: require_str(&config.config, &config.name, "pipeline")?,
            input: optional_object(&config.config, "input"),
            output_mapping: optional_object(&config.config, "output_mapping"),
        }))
    });
}

// =============================================================================
// step.delegate
// =============================================================================

/// Calls a named service's action for pipeline composition
pub struct DelegateStep {
    name: String,
    service: Arc<dyn ServiceDelegate>,
    action: String,
    input: Option<Value>,
    target: Option<String>,
}

#[async_trait]
impl PipelineStep for DelegateStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.delegate"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let input = match &self.input {
            Some(input) => render_config_value(input, &root)?,
            None => Value::Object(ctx.data.clone()),
        };

        let output = self
            .service
            .call(&self.action, &input)
            .await
            .map_err(|err| PipelineError::step(&self.name, err))?;

        if let Some(target) = &self.target {
            ctx.data.insert(target.clone(), output.clone());
        }
        ctx.record_step_output(&self.name, output)?;
        Ok(())
    }
}

// =============================================================================
// step.workflow_call
// =============================================================================

/// Executes another registered pipeline synchronously
///
/// The declared `input` mapping seeds the sub-context's data;
/// `output_mapping` copies fields of the sub-context's final data back into
/// the caller.
pub struct WorkflowCallStep {
    name: String,
    pipelines: Arc<PipelineRegistry>,
    target: String,
    /// caller-data template → sub-context field
    input: Map<String, Value>,
    /// caller field → sub-context result field
    output_mapping: Map<String, Value>,
}

#[async_trait]
impl PipelineStep for WorkflowCallStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.workflow_call"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let pipeline = self
            .pipelines
            .get(&self.target)
            .ok_or_else(|| PipelineError::UnknownPipeline(self.target.clone()))?;

        let root = ctx.template_root();
        let rendered = render_config_value(&Value::Object(self.input.clone()), &root)?;
        let Value::Object(seed) = rendered else {
            return Err(PipelineError::step(&self.name, "input must be a mapping"));
        };

        let mut sub = PipelineContext::new(seed).with_cancel(ctx.cancel.child_token());
        sub.metadata.workflow_id = ctx.metadata.workflow_id.clone();

        // Sub-pipelines execute inline; Box keeps the recursive future sized.
        Box::pin(pipeline.execute(&mut sub)).await?;

        for (caller_field, sub_field) in &self.output_mapping {
            let Some(sub_field) = sub_field.as_str() else {
                return Err(PipelineError::step(
                    &self.name,
                    "output_mapping values must be field names",
                ));
            };
            let value = sub.data.get(sub_field).cloned().unwrap_or(Value::Null);
            ctx.data.insert(caller_field.clone(), value);
        }

        ctx.record_step_output(&self.name, Value::Object(sub.data))?;
        Ok(())
    }
}
