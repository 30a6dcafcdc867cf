//! Transition guards and hooks

use async_trait::async_trait;
use serde_json::Value;

use crate::instance::Instance;

/// Decides whether a transition may fire
#[async_trait]
pub trait TransitionGuard: Send + Sync {
    /// Return `Ok(false)` to reject the transition
    async fn check(&self, instance: &Instance, payload: &Value) -> Result<bool, String>;
}

/// Side effects around a transition
///
/// A `before` error aborts the transition with the instance untouched. An
/// `after` error is logged; the transition stays committed.
#[async_trait]
pub trait TransitionHook: Send + Sync {
    /// Runs before the state is assigned
    async fn before(&self, instance: &Instance, payload: &Value) -> Result<(), String> {
        let _ = (instance, payload);
        Ok(())
    }

    /// Runs after the state is committed
    async fn after(&self, instance: &Instance, payload: &Value) -> Result<(), String> {
        let _ = (instance, payload);
        Ok(())
    }
}
