//! Engine builder
//!
//! Turns a `WorkflowConfig` into a running `Engine`:
//!
//! 1. resolve defaults (application, secret resolver, metrics)
//! 2. create the engine registries (modules, steps, triggers, handlers)
//! 3. register plugins
//! 4. expand secrets and construct each module, in declared order
//! 5. compute the dependency order, rejecting cycles
//! 6. init modules in topological order, then seal the registry
//! 7. wire each declared workflow into the first claiming handler
//! 8. construct each declared trigger
//! 9. build standalone pipelines and freeze the pipeline registry

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use tokio_util::sync::CancellationToken;

use weft_broker::InProcessBroker;
use weft_config::{
    expand_config_value, load_file, merge_application, validate_config_with_options, LoadedConfig,
    SecretProvider, SecretResolver, ValidateOptions, WorkflowConfig,
};
use weft_core::{services, Application};
use weft_pipeline::{PipelineRegistry, StepFactoryRegistry};

use crate::dynamic::{DynamicRegistry, DYNAMIC_REGISTRY_SERVICE};
use crate::engine::{make_engine, Dispatcher, Engine, EngineInner, EngineStatus};
use crate::error::EngineError;
use crate::handler::{WireContext, WorkflowHandler};
use crate::handlers::default_handlers;
use crate::metrics::MetricsCollector;
use crate::plugin::{ModuleFactoryRegistry, Plugin, PluginContext, TriggerFactoryRegistry};

/// Dispatch handle registered under the reserved `workflow-engine` name
///
/// Modules resolve this during init and call `dispatcher()` at runtime,
/// once the engine exists.
#[derive(Default)]
pub struct EngineHandle {
    dispatcher: OnceLock<Dispatcher>,
}

impl EngineHandle {
    /// The engine dispatcher, once built
    #[must_use]
    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.dispatcher.get().cloned()
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    module_factories: ModuleFactoryRegistry,
    step_factories: StepFactoryRegistry,
    trigger_factories: TriggerFactoryRegistry,
    plugins: Vec<Arc<dyn Plugin>>,
    resolver: Arc<SecretResolver>,
    dynamic_registry: Arc<DynamicRegistry>,
    use_default_handlers: bool,
    use_dynamic_components: bool,
    config_path: Option<PathBuf>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Create a builder with the built-in module and step factories
    #[must_use]
    pub fn new() -> Self {
        Self {
            module_factories: ModuleFactoryRegistry::with_builtins(),
            step_factories: StepFactoryRegistry::with_builtins(),
            trigger_factories: TriggerFactoryRegistry::new(),
            plugins: Vec::new(),
            resolver: Arc::new(SecretResolver::new()),
            dynamic_registry: Arc::new(DynamicRegistry::new()),
            use_default_handlers: false,
            use_dynamic_components: false,
            config_path: None,
        }
    }

    /// Enable the seven core workflow handlers
    #[must_use]
    pub fn with_default_handlers(mut self) -> Self {
        self.use_default_handlers = true;
        self
    }

    /// Enable the built-in trigger types
    #[must_use]
    pub fn with_default_triggers(mut self) -> Self {
        self.trigger_factories = TriggerFactoryRegistry::with_builtins();
        self
    }

    /// Expose the dynamic component registry to `dynamic.component` modules
    #[must_use]
    pub fn with_dynamic_components(mut self) -> Self {
        self.use_dynamic_components = true;
        self
    }

    /// Add a plugin contributing factories and handlers
    #[must_use]
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Set the config file `build` loads
    #[must_use]
    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Register a secret provider for a `${scheme:key}` scheme
    #[must_use]
    pub fn with_secret_provider(self, scheme: &str, provider: Arc<dyn SecretProvider>) -> Self {
        self.resolver.register_provider(scheme, provider);
        self
    }

    /// The dynamic component registry, for hosts that load components
    #[must_use]
    pub fn dynamic_registry(&self) -> Arc<DynamicRegistry> {
        self.dynamic_registry.clone()
    }

    /// Load the configured file and build
    pub async fn build(self) -> Result<Engine, EngineError> {
        let path = self.config_path.clone().ok_or_else(|| {
            EngineError::Config(weft_config::ConfigError::Io {
                path: "<unset>".to_string(),
                message: "no config path supplied".to_string(),
            })
        })?;

        let config = match load_file(&path)? {
            LoadedConfig::Workflow(config) => config,
            LoadedConfig::Application { config, config_dir } => {
                merge_application(&config, &config_dir)?
            }
        };
        self.build_from_config(config).await
    }

    /// Build an engine from an in-memory config
    pub async fn build_from_config(mut self, config: WorkflowConfig) -> Result<Engine, EngineError> {
        // 1–3: defaults, registries, plugins.
        let app = Arc::new(Application::new());
        let metrics = Arc::new(MetricsCollector::new());

        let mut plugin_handlers: Vec<Arc<dyn WorkflowHandler>> = Vec::new();
        let mut extra_workflow_types: Vec<String> = Vec::new();
        for plugin in &self.plugins {
            tracing::debug!(plugin = plugin.name(), "registering plugin");
            let mut ctx = PluginContext {
                modules: &mut self.module_factories,
                steps: &mut self.step_factories,
                triggers: &mut self.trigger_factories,
                handlers: &mut plugin_handlers,
                extra_workflow_types: &mut extra_workflow_types,
            };
            plugin.register(&mut ctx);
        }

        let report = validate_config_with_options(
            &config,
            &ValidateOptions {
                extra_workflow_types,
            },
        );
        if !report.is_valid() {
            return Err(EngineError::Validation(report));
        }

        app.registry()
            .register(services::METRICS_COLLECTOR, metrics.clone())
            .map_err(weft_core::LifecycleError::Registry)?;
        app.registry()
            .register(services::SECRETS_RESOLVER, self.resolver.clone())
            .map_err(weft_core::LifecycleError::Registry)?;
        if self.use_dynamic_components {
            app.registry()
                .register(DYNAMIC_REGISTRY_SERVICE, self.dynamic_registry.clone())
                .map_err(weft_core::LifecycleError::Registry)?;
        }
        let engine_handle = Arc::new(EngineHandle::default());
        app.registry()
            .register(services::WORKFLOW_ENGINE, engine_handle.clone())
            .map_err(weft_core::LifecycleError::Registry)?;

        // 4: expand secrets and construct each module in declared order.
        for module_config in &config.modules {
            let mut expanded = module_config.clone();
            expand_config_value(&self.resolver, &mut expanded.config);

            let module = self.module_factories.create(&expanded)?;
            app.register_module(module)?;
        }

        // 5–6: topological init; cycles and missing services are fatal.
        app.init_all().await?;

        // The engine wires itself to the first configured in-process broker.
        let broker: Option<InProcessBroker> = config
            .modules
            .iter()
            .find(|m| m.kind == "messaging.broker")
            .and_then(|m| app.registry().get(&m.name));

        let pipelines = Arc::new(PipelineRegistry::new());
        let inner = Arc::new(EngineInner {
            app: app.clone(),
            handlers: RwLock::new(Vec::new()),
            triggers: RwLock::new(Vec::new()),
            pipelines: pipelines.clone(),
            producer: broker.as_ref().map(InProcessBroker::producer),
            metrics: metrics.clone(),
            config: RwLock::new(config.clone()),
            status: RwLock::new(EngineStatus::Built),
            shutdown: CancellationToken::new(),
        });
        let engine = make_engine(inner.clone());
        let _ = engine_handle.dispatcher.set(engine.dispatcher());

        let wire_ctx = WireContext {
            app,
            pipelines: pipelines.clone(),
            step_factories: Arc::new(self.step_factories.clone()),
            broker,
            metrics,
            dispatcher: engine.dispatcher(),
        };

        {
            let mut handlers = inner.handlers.write().unwrap_or_else(|e| e.into_inner());
            if self.use_default_handlers {
                handlers.extend(default_handlers(&wire_ctx));
            }
            handlers.extend(plugin_handlers);
        }

        // 7: wire each declared workflow into the first claiming handler.
        for (kind, workflow_config) in &config.workflows {
            let handler = {
                let handlers = inner.handlers.read().unwrap_or_else(|e| e.into_inner());
                handlers.iter().find(|h| h.can_handle(kind)).cloned()
            }
            .ok_or_else(|| EngineError::UnknownWorkflowType(kind.clone()))?;

            tracing::debug!(workflow = %kind, handler = handler.name(), "configuring workflow");
            handler.configure(&wire_ctx, workflow_config).await?;
        }

        // 8: construct each declared trigger.
        {
            let mut triggers = inner.triggers.write().unwrap_or_else(|e| e.into_inner());
            for (name, trigger_config) in &config.triggers {
                let trigger = self.trigger_factories.create(name, trigger_config, &wire_ctx)?;
                triggers.push(trigger);
            }
        }

        // 9: build standalone pipelines so `step.workflow_call` can target
        // them cross-workflow, then freeze the registry.
        let step_env = wire_ctx.step_env();
        for (name, pipeline_config) in &config.pipelines {
            let pipeline = self
                .step_factories
                .build_pipeline(name, pipeline_config, &step_env)?;
            pipelines.register(Arc::new(pipeline))?;
        }
        pipelines.freeze();

        Ok(engine)
    }

    /// Build, start, and block until SIGINT/SIGTERM, then stop gracefully
    pub async fn run_until_signal(self, config: WorkflowConfig) -> Result<(), EngineError> {
        let engine = self.build_from_config(config).await?;
        engine.start().await?;

        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        engine.stop().await
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
