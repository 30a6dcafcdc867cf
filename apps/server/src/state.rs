//! Shared server state
//!
//! Holds the current config and the engine built from it. Reload rebuilds
//! the whole engine and swaps it; callers observe the new behavior on their
//! next request.

use std::sync::Arc;

use tokio::sync::RwLock;

use weft_config::WorkflowConfig;
use weft_engine::{Engine, EngineBuilder};

/// Creates a fresh builder per (re)build
pub type BuilderFactory = Arc<dyn Fn() -> EngineBuilder + Send + Sync>;

struct Inner {
    config: RwLock<WorkflowConfig>,
    engine: RwLock<Option<Engine>>,
    make_builder: BuilderFactory,
}

/// Shared state behind the management API
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<Inner>,
}

impl ServerState {
    /// Create state with a builder factory and an initial config
    #[must_use]
    pub fn new(make_builder: BuilderFactory, config: WorkflowConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(config),
                engine: RwLock::new(None),
                make_builder,
            }),
        }
    }

    /// State with default builder settings and an empty config
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(|| {
                EngineBuilder::new()
                    .with_default_handlers()
                    .with_default_triggers()
            }),
            WorkflowConfig::default(),
        )
    }

    /// Snapshot of the current config
    pub async fn config(&self) -> WorkflowConfig {
        self.inner.config.read().await.clone()
    }

    /// Replace the current config; takes effect on the next reload
    pub async fn set_config(&self, config: WorkflowConfig) {
        let mut current = self.inner.config.write().await;
        *current = config;
    }

    /// The running engine, if any
    pub async fn engine(&self) -> Option<Engine> {
        self.inner.engine.read().await.clone()
    }

    /// Adopt an engine built outside the management API
    pub async fn set_engine(&self, engine: Engine) {
        let mut current = self.inner.engine.write().await;
        *current = Some(engine);
    }

    /// Rebuild the engine from the current config and swap it in
    ///
    /// The replacement is built and started before the previous engine is
    /// touched, so a failure at either stage leaves the running engine in
    /// place. Modules binding fixed addresses must tolerate the brief
    /// overlap; ephemeral (`:0`) listeners always do.
    pub async fn reload(&self) -> Result<(), weft_engine::EngineError> {
        let config = self.config().await;
        let engine = (self.inner.make_builder)().build_from_config(config).await?;
        engine.start().await?;

        let previous = {
            let mut current = self.inner.engine.write().await;
            current.replace(engine)
        };
        if let Some(previous) = previous {
            if let Err(err) = previous.stop().await {
                tracing::warn!(error = %err, "previous engine stop failed during reload");
            }
        }
        Ok(())
    }

    /// Stop the running engine, if any
    pub async fn shutdown(&self) {
        let engine = {
            let mut current = self.inner.engine.write().await;
            current.take()
        };
        if let Some(engine) = engine {
            if let Err(err) = engine.stop().await {
                tracing::warn!(error = %err, "engine stop failed during shutdown");
            }
        }
    }
}
