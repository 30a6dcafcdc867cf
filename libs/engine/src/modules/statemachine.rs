//! `statemachine.engine` - state machine engine module

use std::sync::Arc;

use async_trait::async_trait;

use weft_core::{Application, LifecycleError, Module};
use weft_statemachine::StateMachineEngine;

use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("statemachine.engine", |config| {
        Ok(Arc::new(StateMachineModule {
            name: config.name.clone(),
            engine: Arc::new(StateMachineEngine::new()),
        }))
    });
}

/// Module wrapping one state machine engine
pub struct StateMachineModule {
    name: String,
    engine: Arc<StateMachineEngine>,
}

#[async_trait]
impl Module for StateMachineModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        app.registry()
            .register(&self.name, self.engine.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }
}
