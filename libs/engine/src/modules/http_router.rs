//! `http.router` - route table mounted into an HTTP server
//!
//! Handlers and triggers add routes during wiring; the server module turns
//! the table into an axum router at start. Paths use `{param}` placeholders,
//! which axum shares.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, RawPathParams};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodFilter;
use axum::Json;
use serde_json::{Map, Value};
use uuid::Uuid;

use weft_core::{Application, LifecycleError, Module};
use weft_pipeline::{
    HttpRequestContext, HttpResponseContext, Pipeline, PipelineContext, PipelineRegistry,
};

use crate::engine::Dispatcher;
use crate::error::WorkflowError;
use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("http.router", |config| {
        Ok(Arc::new(HttpRouterModule {
            name: config.name.clone(),
            router: Arc::new(HttpRouter::default()),
        }))
    });
}

// =============================================================================
// Route Model
// =============================================================================

/// Module-provided request handler for classical routes
#[async_trait]
pub trait HttpHandlerService: Send + Sync {
    /// Handle one request
    async fn handle(&self, request: HttpRequestContext)
        -> Result<HttpResponseContext, WorkflowError>;
}

/// What a route dispatches into
#[derive(Clone)]
pub enum RouteTarget {
    /// Execute a pipeline, by name or inline
    Pipeline {
        reference: PipelineRef,
        pipelines: Arc<PipelineRegistry>,
    },

    /// Delegate to a handler module
    Handler(Arc<dyn HttpHandlerService>),

    /// Dispatch a workflow through the engine
    Workflow {
        kind: String,
        action: String,
        /// Response status on success (default 200)
        status: Option<u16>,
        dispatcher: Dispatcher,
    },
}

/// A pipeline reference resolved per request
#[derive(Clone)]
pub enum PipelineRef {
    Named(String),
    Inline(Arc<Pipeline>),
}

/// One mounted route
#[derive(Clone)]
pub struct RouteSpec {
    pub method: String,
    pub path: String,
    pub target: RouteTarget,
}

/// The route table service registered under the router module's name
#[derive(Default)]
pub struct HttpRouter {
    routes: Mutex<Vec<Arc<RouteSpec>>>,
}

impl HttpRouter {
    /// Mount a route
    pub fn add_route(&self, spec: RouteSpec) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.push(Arc::new(spec));
    }

    /// Number of mounted routes
    #[must_use]
    pub fn route_count(&self) -> usize {
        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.len()
    }

    /// Build an axum router over the current table
    #[must_use]
    pub fn to_axum(&self) -> axum::Router {
        let routes = {
            let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            routes.clone()
        };

        let mut router = axum::Router::new();
        for spec in routes {
            let Some(filter) = method_filter(&spec.method) else {
                tracing::warn!(method = %spec.method, path = %spec.path, "unsupported route method");
                continue;
            };
            let path = spec.path.clone();
            let handler = move |params: RawPathParams,
                                Query(query): Query<HashMap<String, String>>,
                                headers: HeaderMap,
                                body: Bytes| {
                let spec = spec.clone();
                async move { serve_route(spec, params, query, headers, body).await }
            };
            router = router.route(&path, axum::routing::on(filter, handler));
        }
        router
    }
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method.to_uppercase().as_str() {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "PATCH" => Some(MethodFilter::PATCH),
        "DELETE" => Some(MethodFilter::DELETE),
        "HEAD" => Some(MethodFilter::HEAD),
        "OPTIONS" => Some(MethodFilter::OPTIONS),
        _ => None,
    }
}

// =============================================================================
// Request Dispatch
// =============================================================================

async fn serve_route(
    spec: Arc<RouteSpec>,
    params: RawPathParams,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = build_request_context(&spec, &params, query, &headers, &body);

    let result = match &spec.target {
        RouteTarget::Handler(handler) => handler.handle(request).await,
        RouteTarget::Pipeline {
            reference,
            pipelines,
        } => run_pipeline_route(reference, pipelines, request).await,
        RouteTarget::Workflow {
            kind,
            action,
            status,
            dispatcher,
        } => {
            let data = request_as_data(&request);
            dispatcher
                .trigger_workflow(kind, action, Value::Object(data))
                .await
                .map(|result| HttpResponseContext {
                    status: status.unwrap_or(200),
                    headers: vec![("content-type".to_string(), "application/json".to_string())],
                    body: result,
                })
        }
    };

    match result {
        Ok(response) => response_to_axum(response),
        Err(err) => error_to_axum(&err),
    }
}

fn build_request_context(
    spec: &RouteSpec,
    params: &RawPathParams,
    query: HashMap<String, String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> HttpRequestContext {
    let mut path_params = Map::new();
    for (name, value) in params.iter() {
        path_params.insert(name.to_string(), Value::String(value.to_string()));
    }

    let mut query_map = Map::new();
    for (name, value) in query {
        query_map.insert(name, Value::String(value));
    }

    let mut header_map = Map::new();
    for (name, value) in headers {
        if let Ok(text) = value.to_str() {
            header_map.insert(name.to_string(), Value::String(text.to_string()));
        }
    }

    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    };

    HttpRequestContext {
        method: spec.method.to_uppercase(),
        path: spec.path.clone(),
        path_params,
        query: query_map,
        headers: header_map,
        body,
    }
}

/// Flatten a request into workflow dispatch data
fn request_as_data(request: &HttpRequestContext) -> Map<String, Value> {
    let mut data = Map::new();
    data.extend(request.path_params.clone());
    data.extend(request.query.clone());
    if let Value::Object(fields) = &request.body {
        data.extend(fields.clone());
    }
    data
}

async fn run_pipeline_route(
    reference: &PipelineRef,
    pipelines: &Arc<PipelineRegistry>,
    request: HttpRequestContext,
) -> Result<HttpResponseContext, WorkflowError> {
    let pipeline = match reference {
        PipelineRef::Inline(pipeline) => pipeline.clone(),
        PipelineRef::Named(name) => pipelines
            .get(name)
            .ok_or_else(|| WorkflowError::NotFound(format!("Unknown pipeline: {name}")))?,
    };

    let mut ctx = PipelineContext::default().with_request(request);
    pipeline.execute(&mut ctx).await?;

    Ok(ctx.response.unwrap_or_else(|| HttpResponseContext {
        status: 200,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: serde_json::json!({"success": true, "data": Value::Object(ctx.data)}),
    }))
}

// =============================================================================
// Response Mapping
// =============================================================================

fn response_to_axum(response: HttpResponseContext) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut out = (status, Json(response.body)).into_response();
    for (name, value) in response.headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::try_from(name.as_str()),
            axum::http::HeaderValue::try_from(value.as_str()),
        ) {
            out.headers_mut().insert(name, value);
        }
    }
    out
}

/// Spec mapping: 400/404 carry the message; 500 hides it behind a
/// correlation id.
fn error_to_axum(err: &WorkflowError) -> Response {
    match err {
        WorkflowError::NotFound(message) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": message})),
        )
            .into_response(),
        WorkflowError::BadRequest(message) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"success": false, "error": message})),
        )
            .into_response(),
        WorkflowError::Cancelled | WorkflowError::Internal(_) => {
            let correlation_id = Uuid::new_v4();
            tracing::error!(%correlation_id, error = %err, "internal error serving route");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "internal error",
                    "correlationId": correlation_id,
                })),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Module
// =============================================================================

/// Router module: registers its route table as a service
pub struct HttpRouterModule {
    name: String,
    router: Arc<HttpRouter>,
}

#[async_trait]
impl Module for HttpRouterModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        app.registry()
            .register(&self.name, self.router.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_route_and_count() {
        let router = HttpRouter::default();
        router.add_route(RouteSpec {
            method: "GET".to_string(),
            path: "/health".to_string(),
            target: RouteTarget::Pipeline {
                reference: PipelineRef::Named("health".to_string()),
                pipelines: Arc::new(PipelineRegistry::new()),
            },
        });
        assert_eq!(router.route_count(), 1);
    }

    #[test]
    fn test_method_filter_rejects_garbage() {
        assert!(method_filter("BREW").is_none());
        assert!(method_filter("get").is_some());
    }
}
