//! `step.set`, `step.transform`, and `step.log`

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::{optional_object, optional_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.set", |config, _env| {
        Ok(std::sync::Arc::new(SetStep {
            name: config.name.clone(),
            values: optional_object(&config.config, "values"),
        }))
    });

    registry.register("step.transform", |config, _env| {
        Ok(std::sync::Arc::new(TransformStep {
            name: config.name.clone(),
            mappings: optional_object(&config.config, "mappings"),
            drop: config
                .config
                .get("drop")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }))
    });

    registry.register("step.log", |config, _env| {
        Ok(std::sync::Arc::new(LogStep {
            name: config.name.clone(),
            level: optional_str(&config.config, "level").unwrap_or_else(|| "info".to_string()),
            message: optional_str(&config.config, "message").unwrap_or_default(),
        }))
    });
}

// =============================================================================
// step.set
// =============================================================================

/// Writes literal or templated values into `data`
pub struct SetStep {
    name: String,
    values: Map<String, Value>,
}

#[async_trait]
impl PipelineStep for SetStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.set"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let rendered = render_config_value(&Value::Object(self.values.clone()), &root)?;

        let Value::Object(fields) = rendered else {
            return Err(PipelineError::step(&self.name, "values must be a mapping"));
        };
        ctx.merge_data(&fields);
        ctx.record_step_output(&self.name, Value::Object(fields))?;
        Ok(())
    }
}

// =============================================================================
// step.transform
// =============================================================================

/// Renames and reshapes `data` fields via a mapping
pub struct TransformStep {
    name: String,
    /// target field → template or source expression
    mappings: Map<String, Value>,
    /// fields to remove after mapping
    drop: Vec<String>,
}

#[async_trait]
impl PipelineStep for TransformStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.transform"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let rendered = render_config_value(&Value::Object(self.mappings.clone()), &root)?;

        let Value::Object(fields) = rendered else {
            return Err(PipelineError::step(&self.name, "mappings must be a mapping"));
        };
        ctx.merge_data(&fields);
        for field in &self.drop {
            ctx.data.remove(field);
        }
        ctx.record_step_output(&self.name, Value::Object(fields))?;
        Ok(())
    }
}

// =============================================================================
// step.log
// =============================================================================

/// Structured log line at a configured level
pub struct LogStep {
    name: String,
    level: String,
    message: String,
}

#[async_trait]
impl PipelineStep for LogStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.log"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let message = crate::template::render_str(&self.message, &root)?;
        let message = message.as_str().map_or_else(|| message.to_string(), str::to_string);

        match self.level.as_str() {
            "trace" => tracing::trace!(step = %self.name, "{message}"),
            "debug" => tracing::debug!(step = %self.name, "{message}"),
            "warn" => tracing::warn!(step = %self.name, "{message}"),
            "error" => tracing::error!(step = %self.name, "{message}"),
            _ => tracing::info!(step = %self.name, "{message}"),
        }

        ctx.record_step_output(&self.name, serde_json::json!({"logged": true}))?;
        Ok(())
    }
}
