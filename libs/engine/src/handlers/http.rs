//! HTTP workflow handler
//!
//! Wires `{server, router, routes[]}` into the named router module. Each
//! route targets a handler module, a named pipeline, an inline step list,
//! or a workflow dispatch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use weft_config::{ErrorStrategy, PipelineConfig, StepConfig};
use weft_pipeline::PipelineContext;

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};
use crate::modules::http_router::{
    HttpHandlerService, HttpRouter, PipelineRef, RouteSpec, RouteTarget,
};

/// Route declaration inside an `http` workflow
#[derive(Debug, Clone, Deserialize)]
struct RouteConfig {
    method: String,
    path: String,

    /// Module name of a classical request handler
    #[serde(default)]
    handler: Option<String>,

    /// Named pipeline reference or inline step list
    #[serde(default)]
    pipeline: Option<Value>,

    /// Workflow dispatch target
    #[serde(default)]
    workflow: Option<String>,
    #[serde(default)]
    action: Option<String>,
    /// Response status for workflow targets (default 200)
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpWorkflowConfig {
    router: String,
    #[serde(default)]
    routes: Vec<RouteConfig>,
}

/// Handler for the `http` workflow type
pub struct HttpWorkflowHandler {
    ctx: WireContext,
    /// Mounted routes, kept for direct `execute` invocations
    routes: Mutex<Vec<Arc<RouteSpec>>>,
}

impl HttpWorkflowHandler {
    /// Create the handler
    #[must_use]
    pub fn new(ctx: WireContext) -> Self {
        Self {
            ctx,
            routes: Mutex::new(Vec::new()),
        }
    }

    fn build_target(&self, route: &RouteConfig) -> Result<RouteTarget, EngineError> {
        if let Some(handler_name) = &route.handler {
            let service: Arc<dyn HttpHandlerService> = self
                .ctx
                .app
                .registry()
                .get(handler_name)
                .ok_or_else(|| {
                    EngineError::wiring("http", format!("unknown handler module '{handler_name}'"))
                })?;
            return Ok(RouteTarget::Handler(service));
        }

        if let Some(pipeline) = &route.pipeline {
            let reference = match pipeline {
                Value::String(name) => PipelineRef::Named(name.clone()),
                inline => {
                    let steps: Vec<StepConfig> =
                        serde_json::from_value(inline.clone()).map_err(|err| {
                            EngineError::wiring("http", format!("bad inline pipeline: {err}"))
                        })?;
                    let config = PipelineConfig {
                        description: None,
                        error_strategy: ErrorStrategy::FailFast,
                        steps,
                    };
                    let name = format!("{} {}", route.method.to_uppercase(), route.path);
                    let built = self.ctx.step_factories.build_pipeline(
                        &name,
                        &config,
                        &self.ctx.step_env(),
                    )?;
                    PipelineRef::Inline(Arc::new(built))
                }
            };
            return Ok(RouteTarget::Pipeline {
                reference,
                pipelines: self.ctx.pipelines.clone(),
            });
        }

        if let Some(workflow) = &route.workflow {
            return Ok(RouteTarget::Workflow {
                kind: workflow.clone(),
                action: route.action.clone().unwrap_or_default(),
                status: route.status,
                dispatcher: self.ctx.dispatcher.clone(),
            });
        }

        Err(EngineError::wiring(
            "http",
            format!(
                "route {} {} declares no handler, pipeline, or workflow",
                route.method, route.path
            ),
        ))
    }
}

#[async_trait]
impl WorkflowHandler for HttpWorkflowHandler {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "http"
    }

    async fn configure(&self, ctx: &WireContext, config: &Value) -> Result<(), EngineError> {
        let config: HttpWorkflowConfig = serde_json::from_value(config.clone())
            .map_err(|err| EngineError::wiring("http", err))?;

        let router: Arc<HttpRouter> = ctx.app.registry().get(&config.router).ok_or_else(|| {
            EngineError::wiring("http", format!("unknown router module '{}'", config.router))
        })?;

        for route in &config.routes {
            let spec = RouteSpec {
                method: route.method.to_uppercase(),
                path: route.path.clone(),
                target: self.build_target(route)?,
            };
            router.add_route(spec.clone());
            let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            routes.push(Arc::new(spec));
        }

        Ok(())
    }

    /// Direct invocation: `action` is `"METHOD /path"`, `data` is the body
    async fn execute(
        &self,
        _kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let route = {
            let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            routes
                .iter()
                .find(|r| format!("{} {}", r.method, r.path) == action)
                .cloned()
        }
        .ok_or_else(|| WorkflowError::NotFound(format!("no route matching '{action}'")))?;

        match &route.target {
            RouteTarget::Handler(handler) => {
                let request = weft_pipeline::HttpRequestContext {
                    method: route.method.clone(),
                    path: route.path.clone(),
                    body: data,
                    ..Default::default()
                };
                handler.handle(request).await.map(|response| response.body)
            }
            RouteTarget::Pipeline {
                reference,
                pipelines,
            } => {
                let pipeline = match reference {
                    PipelineRef::Inline(pipeline) => pipeline.clone(),
                    PipelineRef::Named(name) => pipelines.get(name).ok_or_else(|| {
                        WorkflowError::NotFound(format!("Unknown pipeline: {name}"))
                    })?,
                };
                let mut pctx = PipelineContext::from_value(data);
                pipeline.execute(&mut pctx).await?;
                Ok(Value::Object(pctx.data))
            }
            RouteTarget::Workflow {
                kind,
                action,
                dispatcher,
                ..
            } => dispatcher.trigger_workflow(kind, action, data).await,
        }
    }
}
