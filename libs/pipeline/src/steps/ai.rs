//! `step.ai_complete`, `step.ai_classify`, `step.ai_extract`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::services::AiProvider;
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::{optional_str, require_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.ai_complete", |config, env| {
        let service_name = require_str(&config.config, &config.name, "service")?;
        let provider: Arc<dyn AiProvider> = env.require(&service_name)?;
        Ok(Arc::new(AiStep {
            name: config.name.clone(),
            provider,
            action: AiAction::Complete {
                prompt: require_str(&config.config, &config.name, "prompt")?,
            },
            target: optional_str(&config.config, "target"),
        }))
    });

    registry.register("step.ai_classify", |config, env| {
        let service_name = require_str(&config.config, &config.name, "service")?;
        let provider: Arc<dyn AiProvider> = env.require(&service_name)?;
        let labels = config
            .config
            .get("labels")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<String>>()
            })
            .filter(|labels| !labels.is_empty())
            .ok_or_else(|| PipelineError::config(&config.name, "missing 'labels'"))?;
        Ok(Arc::new(AiStep {
            name: config.name.clone(),
            provider,
            action: AiAction::Classify {
                input: require_str(&config.config, &config.name, "input")?,
                labels,
            },
            target: optional_str(&config.config, "target"),
        }))
    });

    registry.register("step.ai_extract", |config, env| {
        let service_name = require_str(&config.config, &config.name, "service")?;
        let provider: Arc<dyn AiProvider> = env.require(&service_name)?;
        let schema = config
            .config
            .get("schema")
            .cloned()
            .ok_or_else(|| PipelineError::config(&config.name, "missing 'schema'"))?;
        Ok(Arc::new(AiStep {
            name: config.name.clone(),
            provider,
            action: AiAction::Extract {
                input: require_str(&config.config, &config.name, "input")?,
                schema,
            },
            target: optional_str(&config.config, "target"),
        }))
    });
}

enum AiAction {
    Complete { prompt: String },
    Classify { input: String, labels: Vec<String> },
    Extract { input: String, schema: Value },
}

/// Delegates to an AI provider service; failures surface as step errors
pub struct AiStep {
    name: String,
    provider: Arc<dyn AiProvider>,
    action: AiAction,
    target: Option<String>,
}

impl AiStep {
    fn render_text(&self, template: &str, root: &Value) -> Result<String, PipelineError> {
        let rendered = render_config_value(&Value::String(template.to_string()), root)?;
        Ok(rendered
            .as_str()
            .map_or_else(|| rendered.to_string(), str::to_string))
    }
}

#[async_trait]
impl PipelineStep for AiStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        match self.action {
            AiAction::Complete { .. } => "step.ai_complete",
            AiAction::Classify { .. } => "step.ai_classify",
            AiAction::Extract { .. } => "step.ai_extract",
        }
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();

        let output = match &self.action {
            AiAction::Complete { prompt } => {
                let prompt = self.render_text(prompt, &root)?;
                let completion = self
                    .provider
                    .complete(&prompt)
                    .await
                    .map_err(|err| PipelineError::step(&self.name, err))?;
                Value::String(completion)
            }
            AiAction::Classify { input, labels } => {
                let input = self.render_text(input, &root)?;
                let label = self
                    .provider
                    .classify(&input, labels)
                    .await
                    .map_err(|err| PipelineError::step(&self.name, err))?;
                Value::String(label)
            }
            AiAction::Extract { input, schema } => {
                let input = self.render_text(input, &root)?;
                self.provider
                    .extract(&input, schema)
                    .await
                    .map_err(|err| PipelineError::step(&self.name, err))?
            }
        };

        if let Some(target) = &self.target {
            ctx.data.insert(target.clone(), output.clone());
        } else if let Value::Object(fields) = &output {
            // Extraction results merge into data when no target is set.
            ctx.merge_data(fields);
        }
        ctx.record_step_output(&self.name, serde_json::json!({"result": output}))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CannedProvider;

    #[async_trait]
    impl AiProvider for CannedProvider {
        async fn complete(&self, prompt: &str) -> Result<String, String> {
            Ok(format!("completed: {prompt}"))
        }

        async fn classify(&self, _input: &str, labels: &[String]) -> Result<String, String> {
            labels.first().cloned().ok_or_else(|| "no labels".to_string())
        }

        async fn extract(&self, _input: &str, _schema: &Value) -> Result<Value, String> {
            Ok(json!({"sentiment": "positive"}))
        }
    }

    #[tokio::test]
    async fn test_complete_renders_prompt() {
        let step = AiStep {
            name: "summarize".to_string(),
            provider: Arc::new(CannedProvider),
            action: AiAction::Complete {
                prompt: "summarize order {{ .order_id }}".to_string(),
            },
            target: Some("summary".to_string()),
        };

        let mut ctx = PipelineContext::from_value(json!({"order_id": "42"}));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.data["summary"], "completed: summarize order 42");
    }

    #[tokio::test]
    async fn test_extract_merges_into_data() {
        let step = AiStep {
            name: "extract".to_string(),
            provider: Arc::new(CannedProvider),
            action: AiAction::Extract {
                input: "{{ .review }}".to_string(),
                schema: json!({"type": "object"}),
            },
            target: None,
        };

        let mut ctx = PipelineContext::from_value(json!({"review": "great"}));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.data["sentiment"], "positive");
    }
}
