//! `step.conditional` - predicate choosing one of two sub-pipelines

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_config::{ErrorStrategy, PipelineConfig, StepConfig};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::executor::Pipeline;
use crate::step::{PipelineStep, StepEnv, StepFactoryRegistry};
use crate::template::{is_truthy, render_config_value};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.conditional", |config, env| {
        let predicate = config
            .config
            .get("if")
            .cloned()
            .ok_or_else(|| PipelineError::config(&config.name, "missing 'if' predicate"))?;

        let then_branch = build_branch(config, env, "then")?;
        let else_branch = build_branch(config, env, "else")?;

        Ok(Arc::new(ConditionalStep {
            name: config.name.clone(),
            predicate,
            then_branch,
            else_branch,
        }))
    });
}

/// Build one branch as an inline sub-pipeline
fn build_branch(
    config: &StepConfig,
    env: &StepEnv,
    branch: &str,
) -> Result<Option<Pipeline>, PipelineError> {
    let Some(steps) = config.config.get(branch) else {
        return Ok(None);
    };
    let steps: Vec<StepConfig> = serde_json::from_value(steps.clone())
        .map_err(|err| PipelineError::config(&config.name, format!("bad '{branch}' steps: {err}")))?;

    let branch_config = PipelineConfig {
        description: None,
        error_strategy: ErrorStrategy::FailFast,
        steps,
    };
    env.factories
        .build_pipeline(&format!("{}.{branch}", config.name), &branch_config, env)
        .map(Some)
}

/// Evaluates a predicate and executes the matching branch
pub struct ConditionalStep {
    name: String,
    predicate: Value,
    then_branch: Option<Pipeline>,
    else_branch: Option<Pipeline>,
}

#[async_trait]
impl PipelineStep for ConditionalStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.conditional"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let matched = evaluate_predicate(&self.predicate, &root, &self.name)?;

        let branch = if matched {
            self.then_branch.as_ref()
        } else {
            self.else_branch.as_ref()
        };

        ctx.record_step_output(
            &self.name,
            serde_json::json!({
                "matched": matched,
                "branch": if matched { "then" } else { "else" },
            }),
        )?;

        if let Some(pipeline) = branch {
            // Branch steps share the caller's context and Box to keep the
            // recursive future sized.
            Box::pin(pipeline.execute(ctx)).await?;
        }
        Ok(())
    }
}

/// Predicate shapes: a bare template string (truthiness) or
/// `{left, op, right}` with `eq|ne|gt|lt|gte|lte|contains|exists`.
fn evaluate_predicate(predicate: &Value, root: &Value, step: &str) -> Result<bool, PipelineError> {
    let rendered = render_config_value(predicate, root)?;

    match &rendered {
        Value::String(_) | Value::Bool(_) => Ok(is_truthy(&rendered)),
        Value::Object(fields) => {
            let op = fields
                .get("op")
                .and_then(Value::as_str)
                .unwrap_or("truthy");
            let left = fields.get("left").cloned().unwrap_or(Value::Null);
            let right = fields.get("right").cloned().unwrap_or(Value::Null);

            match op {
                "truthy" => Ok(is_truthy(&left)),
                "exists" => Ok(!left.is_null()),
                "eq" => Ok(left == right),
                "ne" => Ok(left != right),
                "gt" | "lt" | "gte" | "lte" => {
                    let (a, b) = (as_number(&left), as_number(&right));
                    match (a, b) {
                        (Some(a), Some(b)) => Ok(match op {
                            "gt" => a > b,
                            "lt" => a < b,
                            "gte" => a >= b,
                            _ => a <= b,
                        }),
                        _ => Err(PipelineError::step(
                            step,
                            format!("operator '{op}' requires numeric operands"),
                        )),
                    }
                }
                "contains" => match (&left, &right) {
                    (Value::String(haystack), Value::String(needle)) => {
                        Ok(haystack.contains(needle))
                    }
                    (Value::Array(items), needle) => Ok(items.contains(needle)),
                    _ => Ok(false),
                },
                other => Err(PipelineError::step(step, format!("unknown operator '{other}'"))),
            }
        }
        _ => Ok(is_truthy(&rendered)),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_comparison() {
        let root = json!({"total": 150.0});
        let predicate = json!({"left": "{{ .total }}", "op": "gt", "right": 100});
        assert!(evaluate_predicate(&predicate, &root, "t").unwrap());

        let predicate = json!({"left": "{{ .total }}", "op": "lt", "right": 100});
        assert!(!evaluate_predicate(&predicate, &root, "t").unwrap());
    }

    #[test]
    fn test_equality_on_strings() {
        let root = json!({"status": "paid"});
        let predicate = json!({"left": "{{ .status }}", "op": "eq", "right": "paid"});
        assert!(evaluate_predicate(&predicate, &root, "t").unwrap());
    }

    #[test]
    fn test_exists() {
        let root = json!({"id": "x"});
        assert!(evaluate_predicate(
            &json!({"left": "{{ .id }}", "op": "exists"}),
            &root,
            "t"
        )
        .unwrap());
        assert!(!evaluate_predicate(
            &json!({"left": "{{ .missing }}", "op": "exists"}),
            &root,
            "t"
        )
        .unwrap());
    }

    #[test]
    fn test_bare_template_truthiness() {
        let root = json!({"flag": true});
        assert!(evaluate_predicate(&json!("{{ .flag }}"), &root, "t").unwrap());
    }

    #[test]
    fn test_unknown_operator() {
        let root = json!({});
        assert!(evaluate_predicate(&json!({"op": "resembles"}), &root, "t").is_err());
    }
}
