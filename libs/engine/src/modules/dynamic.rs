//! `dynamic.component` - binds a dynamically loaded component to a service

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use weft_core::{Application, LifecycleError, Module};

use crate::dynamic::{Component, DynamicRegistry, DYNAMIC_REGISTRY_SERVICE};
use crate::error::EngineError;
use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("dynamic.component", |config| {
        let component_id = config
            .config
            .get("component")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::factory(&config.name, "missing 'component' id"))?
            .to_string();
        let service_name = config
            .config
            .get("service")
            .and_then(Value::as_str)
            .unwrap_or(&config.name)
            .to_string();

        Ok(Arc::new(DynamicComponentModule {
            name: config.name.clone(),
            component_id,
            service_name,
            depends_on: config.depends_on.clone(),
            component: OnceLock::new(),
        }))
    });
}

/// Module binding one dynamic component under a canonical service name
pub struct DynamicComponentModule {
    name: String,
    component_id: String,
    service_name: String,
    depends_on: Vec<String>,
    component: OnceLock<Arc<dyn Component>>,
}

#[async_trait]
impl Module for DynamicComponentModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        let registry: Arc<DynamicRegistry> =
            app.require_service(&self.name, DYNAMIC_REGISTRY_SERVICE)?;

        let component = registry.get(&self.component_id).ok_or_else(|| {
            LifecycleError::init(
                &self.name,
                format!("unknown dynamic component '{}'", self.component_id),
            )
        })?;

        component
            .init()
            .await
            .map_err(|err| LifecycleError::init(&self.name, err))?;

        app.registry()
            .register(&self.service_name, component.clone())
            .map_err(LifecycleError::Registry)?;
        let _ = self.component.set(component);
        Ok(())
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        if let Some(component) = self.component.get() {
            component
                .start(shutdown)
                .await
                .map_err(|err| LifecycleError::start(&self.name, err))?;
        }
        Ok(())
    }

    async fn stop(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        if let Some(component) = self.component.get() {
            component
                .stop(shutdown)
                .await
                .map_err(|err| LifecycleError::stop(&self.name, err))?;
        }
        Ok(())
    }
}
