//! Step trait and factory registry
//!
//! Steps are polymorphic, config-driven units of work. A factory registry
//! maps step type keys to constructors; plugins extend it with their own
//! kinds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use weft_broker::Producer;
use weft_config::{PipelineConfig, StepConfig};
use weft_core::Application;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::executor::Pipeline;
use crate::registry::PipelineRegistry;

// =============================================================================
// Step Trait
// =============================================================================

/// A single unit of pipeline work
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Step name, unique within its pipeline
    fn name(&self) -> &str;

    /// Step type key (e.g. `step.set`)
    fn kind(&self) -> &str;

    /// Do the work: read `ctx`, record output under the step name, and
    /// merge selected fields into `ctx.data`.
    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError>;
}

// =============================================================================
// Build Environment
// =============================================================================

/// Everything a step constructor may need
#[derive(Clone)]
pub struct StepEnv {
    /// Application whose service registry steps resolve services from
    pub app: Arc<Application>,

    /// Pipeline registry for `step.workflow_call`
    pub pipelines: Arc<PipelineRegistry>,

    /// Broker producer for `step.publish`, when a broker is wired
    pub producer: Option<Producer>,

    /// Factory registry, for steps that build nested sub-pipelines
    pub factories: Arc<StepFactoryRegistry>,
}

impl StepEnv {
    /// Resolve a service a step requires, by registry name
    pub fn require<T>(&self, service: &str) -> Result<T, PipelineError>
    where
        T: std::any::Any + Clone,
    {
        self.app
            .registry()
            .get::<T>(service)
            .ok_or_else(|| PipelineError::MissingService {
                service: service.to_string(),
            })
    }
}

// =============================================================================
// Factory Registry
// =============================================================================

/// Constructor for one step kind
pub type StepBuilder = Arc<
    dyn Fn(&StepConfig, &StepEnv) -> Result<Arc<dyn PipelineStep>, PipelineError> + Send + Sync,
>;

/// Registry mapping step type keys to constructors
#[derive(Default, Clone)]
pub struct StepFactoryRegistry {
    builders: HashMap<String, StepBuilder>,
}

impl StepFactoryRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in step kind
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::steps::register_builtins(&mut registry);
        registry
    }

    /// Register a constructor for a step kind, replacing any existing one
    pub fn register<F>(&mut self, kind: &str, builder: F)
    where
        F: Fn(&StepConfig, &StepEnv) -> Result<Arc<dyn PipelineStep>, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        self.builders.insert(kind.to_string(), Arc::new(builder));
    }

    /// Registered step kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.builders.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Construct one step
    pub fn create_step(
        &self,
        config: &StepConfig,
        env: &StepEnv,
    ) -> Result<Arc<dyn PipelineStep>, PipelineError> {
        let builder = self
            .builders
            .get(&config.kind)
            .ok_or_else(|| PipelineError::UnknownStepType(config.kind.clone()))?;
        builder(config, env)
    }

    /// Construct a whole pipeline, checking step name uniqueness
    pub fn build_pipeline(
        &self,
        name: &str,
        config: &PipelineConfig,
        env: &StepEnv,
    ) -> Result<Pipeline, PipelineError> {
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(config.steps.len());

        for step_config in &config.steps {
            if !seen.insert(step_config.name.clone()) {
                return Err(PipelineError::DuplicateStepName {
                    pipeline: name.to_string(),
                    step: step_config.name.clone(),
                });
            }
            steps.push(self.create_step(step_config, env)?);
        }

        Ok(Pipeline {
            name: name.to_string(),
            error_strategy: config.error_strategy,
            steps,
        })
    }
}

impl std::fmt::Debug for StepFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepFactoryRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
