//! `http.handler` - classical request handler module
//!
//! Returns a configured JSON document; the default body identifies the
//! handler and reports success. Useful as the target of simple routes and
//! as the reference handler in integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_core::{Application, LifecycleError, Module};
use weft_pipeline::{HttpRequestContext, HttpResponseContext};

use crate::error::WorkflowError;
use crate::modules::http_router::HttpHandlerService;
use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("http.handler", |config| {
        let content_type = config
            .config
            .get("contentType")
            .and_then(Value::as_str)
            .unwrap_or("application/json")
            .to_string();
        let status = config
            .config
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(200);

        Ok(Arc::new(HttpHandlerModule {
            name: config.name.clone(),
            content_type,
            status,
            response: config.config.get("response").cloned(),
        }))
    });
}

/// Static-response handler module
pub struct HttpHandlerModule {
    name: String,
    content_type: String,
    status: u16,
    /// Defaults to `{"handler": <name>, "status": "success"}`
    response: Option<Value>,
}

#[async_trait]
impl Module for HttpHandlerModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        let service: Arc<dyn HttpHandlerService> = Arc::new(StaticHandler {
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            status: self.status,
            response: self.response.clone(),
        });
        app.registry()
            .register(&self.name, service)
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }
}

struct StaticHandler {
    name: String,
    content_type: String,
    status: u16,
    response: Option<Value>,
}

#[async_trait]
impl HttpHandlerService for StaticHandler {
    async fn handle(
        &self,
        _request: HttpRequestContext,
    ) -> Result<HttpResponseContext, WorkflowError> {
        let body = self.response.clone().unwrap_or_else(|| {
            serde_json::json!({"handler": self.name, "status": "success"})
        });
        Ok(HttpResponseContext {
            status: self.status,
            headers: vec![("content-type".to_string(), self.content_type.clone())],
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn test_default_response_names_handler() {
        let handler = StaticHandler {
            name: "test-handler".to_string(),
            content_type: "application/json".to_string(),
            status: 200,
            response: None,
        };

        let response = handler
            .handle(HttpRequestContext {
                method: "POST".to_string(),
                path: "/api/test".to_string(),
                path_params: Map::new(),
                query: Map::new(),
                headers: Map::new(),
                body: serde_json::json!({"hello": "world"}),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body["handler"], "test-handler");
        assert_eq!(response.body["status"], "success");
    }
}
