//! Factory registries and the plugin surface
//!
//! The registry pattern (`type-key → factory`) decouples the engine from
//! concrete module code. Plugins contribute module factories, step
//! factories, triggers, and extra workflow handlers.

use std::collections::HashMap;
use std::sync::Arc;

use weft_config::{ModuleConfig, TriggerConfig};
use weft_core::Module;
use weft_pipeline::StepFactoryRegistry;

use crate::error::EngineError;
use crate::handler::{WireContext, WorkflowHandler};
use crate::triggers::Trigger;

// =============================================================================
// Module Factories
// =============================================================================

/// Constructor for one module type
pub type ModuleFactory =
    Arc<dyn Fn(&ModuleConfig) -> Result<Arc<dyn Module>, EngineError> + Send + Sync>;

/// Registry mapping module type keys to constructors
#[derive(Default, Clone)]
pub struct ModuleFactoryRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleFactoryRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in module type
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::modules::register_builtins(&mut registry);
        registry
    }

    /// Register a factory for a module type, replacing any existing one
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ModuleConfig) -> Result<Arc<dyn Module>, EngineError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    /// Construct a module; unknown types are fatal
    pub fn create(&self, config: &ModuleConfig) -> Result<Arc<dyn Module>, EngineError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| EngineError::UnknownModuleType(config.kind.clone()))?;
        factory(config)
    }

    /// Registered type keys, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

// =============================================================================
// Trigger Factories
// =============================================================================

/// Constructor for one trigger type
pub type TriggerFactory = Arc<
    dyn Fn(&str, &TriggerConfig, &WireContext) -> Result<Arc<dyn Trigger>, EngineError>
        + Send
        + Sync,
>;

/// Registry mapping trigger type keys to constructors
#[derive(Default, Clone)]
pub struct TriggerFactoryRegistry {
    factories: HashMap<String, TriggerFactory>,
}

impl TriggerFactoryRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in trigger type
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::triggers::register_builtins(&mut registry);
        registry
    }

    /// Register a factory for a trigger type, replacing any existing one
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&str, &TriggerConfig, &WireContext) -> Result<Arc<dyn Trigger>, EngineError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    /// Construct a trigger; unknown types are fatal
    pub fn create(
        &self,
        name: &str,
        config: &TriggerConfig,
        ctx: &WireContext,
    ) -> Result<Arc<dyn Trigger>, EngineError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| EngineError::UnknownTriggerType(config.kind.clone()))?;
        factory(name, config, ctx)
    }
}

// =============================================================================
// Plugins
// =============================================================================

/// Mutable registries a plugin may extend
pub struct PluginContext<'a> {
    pub modules: &'a mut ModuleFactoryRegistry,
    pub steps: &'a mut StepFactoryRegistry,
    pub triggers: &'a mut TriggerFactoryRegistry,
    pub handlers: &'a mut Vec<Arc<dyn WorkflowHandler>>,
    /// Extra workflow types the validator should accept
    pub extra_workflow_types: &'a mut Vec<String>,
}

/// An engine extension
pub trait Plugin: Send + Sync {
    /// Plugin name, for logs
    fn name(&self) -> &str;

    /// Contribute factories and handlers
    fn register(&self, ctx: &mut PluginContext<'_>);
}
