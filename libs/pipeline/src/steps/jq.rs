//! `step.jq` - pre-compiled path expression over the pipeline data

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::step::{PipelineStep, StepFactoryRegistry};

use super::{optional_str, require_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.jq", |config, _env| {
        let expression = require_str(&config.config, &config.name, "expression")?;
        let compiled = PathExpr::compile(&expression)
            .map_err(|err| PipelineError::config(&config.name, err))?;

        let input = match optional_str(&config.config, "input") {
            Some(path) => Some(
                PathExpr::compile(&path)
                    .map_err(|err| PipelineError::config(&config.name, err))?,
            ),
            None => None,
        };

        Ok(Arc::new(JqStep {
            name: config.name.clone(),
            expression: compiled,
            input,
            target: optional_str(&config.config, "target"),
        }))
    });
}

// =============================================================================
// Path Expression
// =============================================================================

/// A dot-path selector compiled at build time: `.a.b[0].c`
#[derive(Debug, Clone)]
pub struct PathExpr {
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathExpr {
    /// Compile `.a.b[0]`-style expressions; `.` selects the whole input
    pub fn compile(expression: &str) -> Result<Self, String> {
        let trimmed = expression.trim();
        let body = trimmed
            .strip_prefix('.')
            .ok_or_else(|| format!("expression '{trimmed}' must start with '.'"))?;

        let mut segments = Vec::new();
        if body.is_empty() {
            return Ok(Self { segments });
        }

        for part in body.split('.') {
            let mut rest = part;
            // Leading key, then any number of [n] indices.
            if let Some(bracket) = rest.find('[') {
                if bracket > 0 {
                    segments.push(PathSegment::Key(rest[..bracket].to_string()));
                }
                rest = &rest[bracket..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let close = stripped
                        .find(']')
                        .ok_or_else(|| format!("unclosed index in '{trimmed}'"))?;
                    let index = stripped[..close]
                        .parse::<usize>()
                        .map_err(|_| format!("bad index in '{trimmed}'"))?;
                    segments.push(PathSegment::Index(index));
                    rest = &stripped[close + 1..];
                }
                if !rest.is_empty() {
                    return Err(format!("trailing text in '{trimmed}'"));
                }
            } else {
                if rest.is_empty() {
                    return Err(format!("empty segment in '{trimmed}'"));
                }
                segments.push(PathSegment::Key(rest.to_string()));
            }
        }

        Ok(Self { segments })
    }

    /// Apply the path; missing segments resolve to null
    #[must_use]
    pub fn apply(&self, input: &Value) -> Value {
        let mut current = input;
        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => match map.get(key) {
                    Some(value) => value,
                    None => return Value::Null,
                },
                (PathSegment::Index(idx), Value::Array(items)) => match items.get(*idx) {
                    Some(value) => value,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            };
        }
        current.clone()
    }
}

// =============================================================================
// Step
// =============================================================================

/// Applies a compiled path to an input selection and merges the result
pub struct JqStep {
    name: String,
    expression: PathExpr,
    /// Optional selection applied before the expression; defaults to `data`
    input: Option<PathExpr>,
    /// Field for scalar results; object results merge into `data` directly
    target: Option<String>,
}

#[async_trait]
impl PipelineStep for JqStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.jq"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let data = Value::Object(ctx.data.clone());
        let input = match &self.input {
            Some(path) => path.apply(&data),
            None => data,
        };
        let result = self.expression.apply(&input);

        match (&result, &self.target) {
            (Value::Object(fields), None) => ctx.merge_data(fields),
            (value, Some(target)) => {
                ctx.data.insert(target.clone(), value.clone());
            }
            _ => {}
        }

        ctx.record_step_output(&self.name, serde_json::json!({"result": result}))?;
        Ok(())
    }
}
