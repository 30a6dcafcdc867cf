//! `http.server` - axum listener serving a named router's route table

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use weft_core::{Application, LifecycleError, Module};

use crate::modules::http_router::HttpRouter;
use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("http.server", |config| {
        let address = config
            .config
            .get("address")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(":8080")
            .to_string();
        let router_name = config
            .config
            .get("router")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        Ok(Arc::new(HttpServerModule {
            name: config.name.clone(),
            address,
            router_name,
            depends_on: config.depends_on.clone(),
            handle: Arc::new(HttpServerHandle::default()),
            router: OnceLock::new(),
        }))
    });
}

/// Runtime handle registered under the server module's name
///
/// Exposes the bound address, which matters when the config asks for `:0`.
#[derive(Default, Debug)]
pub struct HttpServerHandle {
    addr: OnceLock<SocketAddr>,
}

impl HttpServerHandle {
    /// Bound address once the server started
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr.get().copied()
    }
}

/// Listener module
pub struct HttpServerModule {
    name: String,
    /// `":8080"` binds all interfaces; `":0"` picks a free port
    address: String,
    router_name: Option<String>,
    depends_on: Vec<String>,
    handle: Arc<HttpServerHandle>,
    router: OnceLock<Arc<HttpRouter>>,
}

#[async_trait]
impl Module for HttpServerModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        let mut deps = self.depends_on.clone();
        if let Some(router) = &self.router_name {
            if !deps.contains(router) {
                deps.push(router.clone());
            }
        }
        deps
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        if let Some(router_name) = &self.router_name {
            let router: Arc<HttpRouter> = app.require_service(&self.name, router_name)?;
            let _ = self.router.set(router);
        }

        app.registry()
            .register(&self.name, self.handle.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let bind_addr = normalize_address(&self.address);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|err| LifecycleError::start(&self.name, format!("bind {bind_addr}: {err}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| LifecycleError::start(&self.name, err))?;
        let _ = self.handle.addr.set(local_addr);

        let router = self
            .router
            .get()
            .map_or_else(axum::Router::new, |router| router.to_axum());

        let name = self.name.clone();
        tokio::spawn(async move {
            tracing::info!(module = %name, address = %local_addr, "http server listening");
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(err) = serve.await {
                tracing::error!(module = %name, error = %err, "http server failed");
            }
        });

        Ok(())
    }

    async fn stop(&self, _shutdown: CancellationToken) -> Result<(), LifecycleError> {
        // Graceful shutdown rides the cancellation token passed to start.
        Ok(())
    }
}

/// `":8080"` → `"0.0.0.0:8080"`; full addresses pass through
fn normalize_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}
