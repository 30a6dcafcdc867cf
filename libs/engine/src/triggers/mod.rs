//! Trigger framework
//!
//! Triggers sit outside the dispatch graph: each one owns tasks that
//! convert external stimuli (HTTP mounts, cron ticks, broker messages,
//! periodic reconciliation) into `trigger_workflow` calls.

pub mod event;
pub mod eventbus;
pub mod http;
pub mod reconciliation;
pub mod schedule;

pub use event::*;
pub use eventbus::*;
pub use http::*;
pub use reconciliation::*;
pub use schedule::*;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::plugin::TriggerFactoryRegistry;

/// An external-stimulus source
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Trigger name, from the config key
    fn name(&self) -> &str;

    /// Trigger type key
    fn kind(&self) -> &str;

    /// Begin converting stimuli into dispatches
    ///
    /// Spawned tasks must return promptly once `shutdown` is cancelled.
    async fn start(&self, shutdown: CancellationToken) -> Result<(), EngineError>;

    /// Stop converting stimuli
    async fn stop(&self) -> Result<(), EngineError>;
}

/// Register every built-in trigger type
pub fn register_builtins(registry: &mut TriggerFactoryRegistry) {
    http::register(registry);
    schedule::register(registry);
    event::register(registry);
    eventbus::register(registry);
    reconciliation::register(registry);
}
