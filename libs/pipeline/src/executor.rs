//! Pipeline execution
//!
//! Steps run in declared order against a shared context. A step failure
//! consults the pipeline's error strategy; a cancelled context aborts at
//! the next step boundary.

use std::sync::Arc;

use serde_json::Value;

use weft_config::ErrorStrategy;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::step::PipelineStep;

/// A built pipeline ready to execute
pub struct Pipeline {
    /// Pipeline name, unique within the engine registry
    pub name: String,

    /// Strategy for step failures
    pub error_strategy: ErrorStrategy,

    /// Steps in execution order
    pub steps: Vec<Arc<dyn PipelineStep>>,
}

impl Pipeline {
    /// Execute every step in order against `ctx`
    ///
    /// On return the caller's context holds the final `data`, the recorded
    /// step outputs, and any response facet a terminal step populated.
    pub async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        for step in &self.steps {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            tracing::debug!(pipeline = %self.name, step = step.name(), kind = step.kind(), "executing step");

            match step.execute(ctx).await {
                Ok(()) => {
                    // Every reached-and-succeeded step leaves an output.
                    if !ctx.steps.contains_key(step.name()) {
                        ctx.steps
                            .insert(step.name().to_string(), Value::Object(serde_json::Map::new()));
                    }
                }
                Err(err) => match self.error_strategy {
                    ErrorStrategy::FailFast => {
                        return Err(PipelineError::step(step.name(), err));
                    }
                    ErrorStrategy::Continue => {
                        tracing::warn!(
                            pipeline = %self.name,
                            step = step.name(),
                            error = %err,
                            "step failed; continuing"
                        );
                    }
                    ErrorStrategy::RecordError => {
                        let entry = ctx
                            .steps
                            .entry(step.name().to_string())
                            .or_insert_with(|| Value::Object(serde_json::Map::new()));
                        if let Value::Object(map) = entry {
                            map.insert("error".to_string(), Value::String(err.to_string()));
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("error_strategy", &self.error_strategy)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct OkStep(&'static str);

    #[async_trait]
    impl PipelineStep for OkStep {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> &str {
            "test.ok"
        }

        async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
            ctx.record_step_output(self.0, json!({"ran": true}))?;
            ctx.data
                .insert(format!("{}_ran", self.0), Value::Bool(true));
            Ok(())
        }
    }

    struct FailStep(&'static str);

    #[async_trait]
    impl PipelineStep for FailStep {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> &str {
            "test.fail"
        }

        async fn execute(&self, _ctx: &mut PipelineContext) -> Result<(), PipelineError> {
            Err(PipelineError::step(self.0, "deliberate failure"))
        }
    }

    fn pipeline(strategy: ErrorStrategy, steps: Vec<Arc<dyn PipelineStep>>) -> Pipeline {
        Pipeline {
            name: "test".to_string(),
            error_strategy: strategy,
            steps,
        }
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_record_outputs() {
        let p = pipeline(
            ErrorStrategy::FailFast,
            vec![Arc::new(OkStep("first")), Arc::new(OkStep("second"))],
        );
        let mut ctx = PipelineContext::default();

        p.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.steps["first"]["ran"], true);
        assert_eq!(ctx.steps["second"]["ran"], true);
        assert_eq!(ctx.data["first_ran"], true);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_execution() {
        let p = pipeline(
            ErrorStrategy::FailFast,
            vec![
                Arc::new(OkStep("first")),
                Arc::new(FailStep("boom")),
                Arc::new(OkStep("after")),
            ],
        );
        let mut ctx = PipelineContext::default();

        let err = p.execute(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(!ctx.steps.contains_key("after"));
    }

    #[tokio::test]
    async fn test_continue_runs_remaining_steps() {
        let p = pipeline(
            ErrorStrategy::Continue,
            vec![Arc::new(FailStep("boom")), Arc::new(OkStep("after"))],
        );
        let mut ctx = PipelineContext::default();

        p.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.steps["after"]["ran"], true);
    }

    #[tokio::test]
    async fn test_record_error_attaches_to_step_output() {
        let p = pipeline(
            ErrorStrategy::RecordError,
            vec![Arc::new(FailStep("boom")), Arc::new(OkStep("after"))],
        );
        let mut ctx = PipelineContext::default();

        p.execute(&mut ctx).await.unwrap();
        assert!(ctx.steps["boom"]["error"]
            .as_str()
            .unwrap()
            .contains("deliberate failure"));
        assert_eq!(ctx.steps["after"]["ran"], true);
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts() {
        let p = pipeline(ErrorStrategy::FailFast, vec![Arc::new(OkStep("first"))]);
        let mut ctx = PipelineContext::default();
        ctx.cancel.cancel();

        let err = p.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
