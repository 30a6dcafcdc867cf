//! Module capability set
//!
//! A module is a named, typed unit with a two-phase lifecycle: build/init
//! wires services, start/stop runs them. Init is the only place a module may
//! query the service registry.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::application::Application;
use crate::error::LifecycleError;

/// Trait implemented by every configured module
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique module name within the application
    fn name(&self) -> &str;

    /// Names of modules that must init/start before this one
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Wire services. Runs once, in dependency order, before any start.
    ///
    /// A module publishes its canonical service under its own name here and
    /// resolves the services it requires. Missing required services are
    /// fatal for the build.
    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        let _ = app;
        Ok(())
    }

    /// Begin doing work. Long-running modules spawn their own tasks and
    /// must watch `shutdown` for cancellation.
    async fn start(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let _ = shutdown;
        Ok(())
    }

    /// Stop doing work. Called in reverse start order.
    async fn stop(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let _ = shutdown;
        Ok(())
    }
}
