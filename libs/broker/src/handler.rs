//! Message handler trait

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the broker
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker has been shut down
    #[error("Broker is closed")]
    Closed,

    /// A subscriber handler failed
    #[error("Handler failed on topic '{topic}': {message}")]
    Handler { topic: String, message: String },
}

/// A subscriber callback for one topic
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message. Payloads are opaque byte sequences.
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Adapter so plain async closures can subscribe
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), BrokerError>> + Send,
{
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        (self.0)(topic.to_string(), payload.to_vec()).await
    }
}
