//! Dynamic component interface
//!
//! An opaque collaborator (script runtimes, plugin loaders) registers
//! components here; a `dynamic.component` module binds one component to a
//! canonical service name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Service name the registry is bound under
pub const DYNAMIC_REGISTRY_SERVICE: &str = "dynamic.registry";

/// A dynamically loaded component
#[async_trait]
pub trait Component: Send + Sync {
    /// One-time setup
    async fn init(&self) -> Result<(), String> {
        Ok(())
    }

    /// Begin work
    async fn start(&self, shutdown: CancellationToken) -> Result<(), String> {
        let _ = shutdown;
        Ok(())
    }

    /// End work
    async fn stop(&self, shutdown: CancellationToken) -> Result<(), String> {
        let _ = shutdown;
        Ok(())
    }

    /// Invoke the component
    async fn execute(&self, params: &Value) -> Result<Map<String, Value>, String>;
}

/// Registry of dynamic components by id
#[derive(Default)]
pub struct DynamicRegistry {
    components: RwLock<HashMap<String, Arc<dyn Component>>>,
}

impl DynamicRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under an id, replacing any existing one
    pub fn register(&self, id: &str, component: Arc<dyn Component>) {
        let mut components = self.components.write().unwrap_or_else(|e| e.into_inner());
        components.insert(id.to_string(), component);
    }

    /// Fetch a component by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Component>> {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        components.get(id).cloned()
    }

    /// Registered component ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = components.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for DynamicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicRegistry")
            .field("components", &self.ids())
            .finish()
    }
}
