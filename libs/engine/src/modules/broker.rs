//! `messaging.broker` - in-process broker module

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use weft_broker::InProcessBroker;
use weft_core::{Application, LifecycleError, Module};

use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("messaging.broker", |config| {
        let broker = match config
            .config
            .get("queueCapacity")
            .and_then(serde_json::Value::as_u64)
        {
            Some(capacity) => {
                InProcessBroker::with_queue_capacity(usize::try_from(capacity).unwrap_or(256))
            }
            None => InProcessBroker::new(),
        };

        Ok(Arc::new(BrokerModule {
            name: config.name.clone(),
            broker,
        }))
    });
}

/// Broker module: registers the broker under its module name
pub struct BrokerModule {
    name: String,
    broker: InProcessBroker,
}

impl BrokerModule {
    /// The owned broker
    #[must_use]
    pub fn broker(&self) -> &InProcessBroker {
        &self.broker
    }
}

#[async_trait]
impl Module for BrokerModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        app.registry()
            .register(&self.name, self.broker.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }

    async fn stop(&self, _shutdown: CancellationToken) -> Result<(), LifecycleError> {
        self.broker.shutdown();
        Ok(())
    }
}
