//! Application container
//!
//! Owns the module table and the service registry, and drives the two-phase
//! lifecycle: init in dependency order, start in the same order, stop in
//! exact reverse start order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use petgraph::algo;
use petgraph::graph::DiGraph;
use tokio_util::sync::CancellationToken;

use crate::error::LifecycleError;
use crate::module::Module;
use crate::registry::ServiceRegistry;

/// Application hosting a set of modules and their services
#[derive(Default)]
pub struct Application {
    registry: ServiceRegistry,
    /// Modules in declared order
    modules: RwLock<Vec<Arc<dyn Module>>>,
    /// Modules in topological order, computed by `init_all`
    ordered: RwLock<Vec<Arc<dyn Module>>>,
    /// Modules that started successfully, in start order
    started: Mutex<Vec<Arc<dyn Module>>>,
}

impl Application {
    /// Create an empty application
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The service registry
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Add a module. Names must be unique.
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<(), LifecycleError> {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        if modules.iter().any(|m| m.name() == module.name()) {
            return Err(LifecycleError::DuplicateModule(module.name().to_string()));
        }
        modules.push(module);
        Ok(())
    }

    /// Look up a module by name
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules.iter().find(|m| m.name() == name).cloned()
    }

    /// Number of registered modules
    #[must_use]
    pub fn module_count(&self) -> usize {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules.len()
    }

    /// Names of registered modules, in declared order
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Resolve a required service or fail with the owning module named
    pub fn require_service<T>(&self, module: &str, service: &str) -> Result<T, LifecycleError>
    where
        T: std::any::Any + Clone,
    {
        self.registry
            .get::<T>(service)
            .ok_or_else(|| LifecycleError::MissingService {
                module: module.to_string(),
                service: service.to_string(),
            })
    }

    /// Compute the topological order honoring `dependencies()`
    ///
    /// Cycles and unknown dependency targets are fatal.
    fn topological_order(&self) -> Result<Vec<Arc<dyn Module>>, LifecycleError> {
        let modules = {
            let guard = self.modules.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        let mut graph = DiGraph::<usize, ()>::new();
        let mut index_of = HashMap::new();

        for (idx, module) in modules.iter().enumerate() {
            let node = graph.add_node(idx);
            index_of.insert(module.name().to_string(), node);
        }

        for module in &modules {
            let to = index_of[module.name()];
            for dep in module.dependencies() {
                let Some(&from) = index_of.get(dep.as_str()) else {
                    return Err(LifecycleError::UnknownDependency {
                        module: module.name().to_string(),
                        dependency: dep,
                    });
                };
                graph.add_edge(from, to, ());
            }
        }

        match algo::toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(|n| modules[graph[n]].clone()).collect()),
            Err(_) => {
                let sccs = algo::kosaraju_scc(&graph);
                let cycle: Vec<&str> = sccs
                    .iter()
                    .find(|scc| scc.len() > 1)
                    .map(|scc| scc.iter().map(|&n| modules[graph[n]].name()).collect())
                    .unwrap_or_default();
                Err(LifecycleError::DependencyCycle(cycle.join(" -> ")))
            }
        }
    }

    /// Init every module in dependency order, then seal the registry
    pub async fn init_all(&self) -> Result<(), LifecycleError> {
        let order = self.topological_order()?;

        for module in &order {
            tracing::debug!(module = module.name(), "initializing module");
            module.init(self).await?;
        }

        {
            let mut ordered = self.ordered.write().unwrap_or_else(|e| e.into_inner());
            *ordered = order;
        }

        self.registry.seal();
        Ok(())
    }

    /// Start every module in topological order
    ///
    /// A start failure is a partial failure: modules that already started
    /// are stopped (in reverse) before the error is returned.
    pub async fn start_all(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let order = {
            let ordered = self.ordered.read().unwrap_or_else(|e| e.into_inner());
            ordered.clone()
        };

        for module in &order {
            tracing::debug!(module = module.name(), "starting module");
            if let Err(err) = module.start(shutdown.clone()).await {
                tracing::error!(module = module.name(), error = %err, "module start failed; rolling back");
                let _ = self.stop_all(shutdown.clone()).await;
                return Err(err);
            }
            let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
            started.push(module.clone());
        }

        Ok(())
    }

    /// Stop every started module in exact reverse start order
    ///
    /// Every started module receives `stop` even when earlier stops fail;
    /// failures are collected into a composite error.
    pub async fn stop_all(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let mut to_stop = {
            let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *started)
        };
        to_stop.reverse();

        let mut failures = Vec::new();
        for module in &to_stop {
            tracing::debug!(module = module.name(), "stopping module");
            if let Err(err) = module.stop(shutdown.clone()).await {
                tracing::warn!(module = module.name(), error = %err, "module stop failed");
                failures.push(err.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Composite(failures))
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("modules", &self.module_names())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records lifecycle calls into a shared log
    struct ProbeModule {
        name: String,
        deps: Vec<String>,
        log: Arc<Mutex<Vec<String>>>,
        fail_start: AtomicBool,
    }

    impl ProbeModule {
        fn new(name: &str, deps: &[&str], log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                deps: deps.iter().map(|d| (*d).to_string()).collect(),
                log,
                fail_start: AtomicBool::new(false),
            })
        }

        fn record(&self, phase: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", phase, self.name));
        }
    }

    #[async_trait]
    impl Module for ProbeModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }

        async fn init(&self, _app: &Application) -> Result<(), LifecycleError> {
            self.record("init");
            Ok(())
        }

        async fn start(&self, _shutdown: CancellationToken) -> Result<(), LifecycleError> {
            if self.fail_start.load(Ordering::Relaxed) {
                return Err(LifecycleError::start(&self.name, "boom"));
            }
            self.record("start");
            Ok(())
        }

        async fn stop(&self, _shutdown: CancellationToken) -> Result<(), LifecycleError> {
            self.record("stop");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_init_respects_dependencies() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::new();

        // Declared out of order; deps must drive the init order.
        app.register_module(ProbeModule::new("sink", &["transform"], log.clone()))
            .unwrap();
        app.register_module(ProbeModule::new("source", &[], log.clone()))
            .unwrap();
        app.register_module(ProbeModule::new("transform", &["source"], log.clone()))
            .unwrap();

        app.init_all().await.unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries, vec!["init:source", "init:transform", "init:sink"]);
    }

    #[tokio::test]
    async fn test_stop_is_reverse_of_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::new();

        app.register_module(ProbeModule::new("a", &[], log.clone()))
            .unwrap();
        app.register_module(ProbeModule::new("b", &["a"], log.clone()))
            .unwrap();

        let token = CancellationToken::new();
        app.init_all().await.unwrap();
        app.start_all(token.clone()).await.unwrap();
        app.stop_all(token).await.unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["init:a", "init:b", "start:a", "start:b", "stop:b", "stop:a"]
        );
    }

    #[tokio::test]
    async fn test_start_failure_rolls_back_started_prefix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::new();

        app.register_module(ProbeModule::new("a", &[], log.clone()))
            .unwrap();
        let failing = ProbeModule::new("b", &["a"], log.clone());
        failing.fail_start.store(true, Ordering::Relaxed);
        app.register_module(failing).unwrap();

        let token = CancellationToken::new();
        app.init_all().await.unwrap();
        let err = app.start_all(token).await.unwrap_err();
        assert!(matches!(err, LifecycleError::StartFailed { .. }));

        let entries = log.lock().unwrap().clone();
        // "a" started and must have been stopped again; "b" never started.
        assert!(entries.contains(&"start:a".to_string()));
        assert!(entries.contains(&"stop:a".to_string()));
        assert!(!entries.contains(&"start:b".to_string()));
    }

    #[tokio::test]
    async fn test_cycle_is_fatal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::new();

        app.register_module(ProbeModule::new("a", &["b"], log.clone()))
            .unwrap();
        app.register_module(ProbeModule::new("b", &["a"], log.clone()))
            .unwrap();

        let err = app.init_all().await.unwrap_err();
        assert!(matches!(err, LifecycleError::DependencyCycle(_)));
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_fatal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::new();

        app.register_module(ProbeModule::new("a", &["missing"], log))
            .unwrap();

        let err = app.init_all().await.unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownDependency { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_module_name_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let app = Application::new();

        app.register_module(ProbeModule::new("a", &[], log.clone()))
            .unwrap();
        let err = app
            .register_module(ProbeModule::new("a", &[], log))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::DuplicateModule(_)));
    }

    #[tokio::test]
    async fn test_registry_sealed_after_init() {
        let app = Application::new();
        app.init_all().await.unwrap();
        assert!(app.registry().is_sealed());
    }
}
