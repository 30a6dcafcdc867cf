//! Pipeline registry
//!
//! Name → pipeline lookup for cross-workflow `step.workflow_call` and the
//! `pipeline:<name>` workflow type. Read-only after build.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::PipelineError;
use crate::executor::Pipeline;

/// Registry of named pipelines
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
    frozen: AtomicBool,
}

impl PipelineRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline under its name
    pub fn register(&self, pipeline: Arc<Pipeline>) -> Result<(), PipelineError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(PipelineError::RegistryFrozen);
        }
        let mut pipelines = self.pipelines.write().unwrap_or_else(|e| e.into_inner());
        if pipelines.contains_key(&pipeline.name) {
            return Err(PipelineError::DuplicatePipeline(pipeline.name.clone()));
        }
        pipelines.insert(pipeline.name.clone(), pipeline);
        Ok(())
    }

    /// Look up a pipeline by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Pipeline>> {
        let pipelines = self.pipelines.read().unwrap_or_else(|e| e.into_inner());
        pipelines.get(name).cloned()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let pipelines = self.pipelines.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = pipelines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forbid further registration once the build completes
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.names())
            .finish()
    }
}
