//! `http` trigger - mounts a route on a named router
//!
//! The route dispatches into a workflow through the engine; the trigger
//! itself owns no tasks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::modules::http_router::{HttpRouter, RouteSpec, RouteTarget};
use crate::plugin::TriggerFactoryRegistry;
use crate::triggers::Trigger;

#[derive(Debug, Clone, Deserialize)]
struct HttpTriggerConfig {
    router: String,
    method: String,
    path: String,
    workflow: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    status: Option<u16>,
}

pub(crate) fn register(registry: &mut TriggerFactoryRegistry) {
    registry.register("http", |name, config, ctx| {
        let config: HttpTriggerConfig = serde_json::from_value(config.config.clone())
            .map_err(|err| EngineError::factory(name, err))?;

        let router: Arc<HttpRouter> = ctx.app.registry().get(&config.router).ok_or_else(|| {
            EngineError::factory(name, format!("unknown router module '{}'", config.router))
        })?;

        router.add_route(RouteSpec {
            method: config.method.to_uppercase(),
            path: config.path.clone(),
            target: RouteTarget::Workflow {
                kind: config.workflow.clone(),
                action: config.action.clone().unwrap_or_default(),
                status: config.status,
                dispatcher: ctx.dispatcher.clone(),
            },
        });

        Ok(Arc::new(HttpTrigger {
            name: name.to_string(),
        }))
    });
}

/// Route-mounting trigger; the server owns the request tasks
pub struct HttpTrigger {
    name: String,
}

#[async_trait]
impl Trigger for HttpTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "http"
    }

    async fn start(&self, _shutdown: CancellationToken) -> Result<(), EngineError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
