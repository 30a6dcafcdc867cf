//! `step.validate` - required fields and JSON-schema enforcement

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::step::{PipelineStep, StepFactoryRegistry};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.validate", |config, _env| {
        let required = config
            .config
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Schemas compile once at build; a bad schema fails the build.
        let schema = match config.config.get("schema") {
            Some(schema) => Some(jsonschema::validator_for(schema).map_err(|err| {
                PipelineError::config(&config.name, format!("invalid schema: {err}"))
            })?),
            None => None,
        };

        Ok(Arc::new(ValidateStep {
            name: config.name.clone(),
            required,
            schema,
        }))
    });
}

/// Enforces required fields and an optional JSON schema over `data`
pub struct ValidateStep {
    name: String,
    required: Vec<String>,
    schema: Option<jsonschema::Validator>,
}

#[async_trait]
impl PipelineStep for ValidateStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.validate"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| !ctx.data.contains_key(field.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        if let Some(schema) = &self.schema {
            let data = Value::Object(ctx.data.clone());
            let violations: Vec<String> = schema
                .iter_errors(&data)
                .map(|err| err.to_string())
                .collect();
            if !violations.is_empty() {
                return Err(PipelineError::Validation(violations.join("; ")));
            }
        }

        ctx.record_step_output(&self.name, serde_json::json!({"valid": true}))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_step(schema: Value) -> ValidateStep {
        ValidateStep {
            name: "check".to_string(),
            required: vec![],
            schema: Some(jsonschema::validator_for(&schema).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_required_fields_pass() {
        let step = ValidateStep {
            name: "check".to_string(),
            required: vec!["id".to_string()],
            schema: None,
        };
        let mut ctx = PipelineContext::from_value(json!({"id": "ORD-001"}));

        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.steps["check"]["valid"], true);
    }

    #[tokio::test]
    async fn test_missing_required_field_names_it() {
        let step = ValidateStep {
            name: "check".to_string(),
            required: vec!["id".to_string(), "total".to_string()],
            schema: None,
        };
        let mut ctx = PipelineContext::from_value(json!({"id": "ORD-001"}));

        let err = step.execute(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("total"));
    }

    #[tokio::test]
    async fn test_schema_violation_fails() {
        let step = schema_step(json!({
            "type": "object",
            "properties": {"total": {"type": "number"}},
            "required": ["total"]
        }));
        let mut ctx = PipelineContext::from_value(json!({"total": "not-a-number"}));

        let err = step.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_schema_pass() {
        let step = schema_step(json!({
            "type": "object",
            "properties": {"total": {"type": "number"}}
        }));
        let mut ctx = PipelineContext::from_value(json!({"total": 99.99}));

        step.execute(&mut ctx).await.unwrap();
    }
}
