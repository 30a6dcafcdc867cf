//! `step.publish` - hand bytes to a broker topic

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_broker::Producer;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::require_str;

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.publish", |config, env| {
        let producer = env.producer.clone().ok_or_else(|| {
            PipelineError::config(&config.name, "no broker wired for step.publish")
        })?;

        Ok(Arc::new(PublishStep {
            name: config.name.clone(),
            producer,
            topic: require_str(&config.config, &config.name, "topic")?,
            payload: config.config.get("payload").cloned(),
        }))
    });
}

/// Publishes a rendered payload to a topic
pub struct PublishStep {
    name: String,
    producer: Producer,
    topic: String,
    /// Defaults to the whole `data` map
    payload: Option<Value>,
}

#[async_trait]
impl PipelineStep for PublishStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.publish"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let payload = match &self.payload {
            Some(payload) => render_config_value(payload, &root)?,
            None => Value::Object(ctx.data.clone()),
        };

        // Strings go out verbatim; everything else as JSON.
        let bytes = match &payload {
            Value::String(s) => s.clone().into_bytes(),
            other => serde_json::to_vec(other)
                .map_err(|err| PipelineError::step(&self.name, err))?,
        };

        self.producer
            .send_message(&self.topic, &bytes)
            .map_err(|err| PipelineError::step(&self.name, err))?;

        ctx.record_step_output(
            &self.name,
            serde_json::json!({"topic": self.topic, "bytes": bytes.len()}),
        )?;
        Ok(())
    }
}
