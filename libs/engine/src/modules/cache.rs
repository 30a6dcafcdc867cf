//! `cache.memory` - in-process LRU cache module

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use weft_core::{Application, LifecycleError, Module};
use weft_infra::TtlCache;

use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("cache.memory", |config| {
        let capacity = config
            .config
            .get("capacity")
            .and_then(Value::as_u64)
            .map_or(1024, |c| usize::try_from(c).unwrap_or(1024));
        let default_ttl = weft_config::duration_field(&config.config, "ttl")
            .map_err(|err| crate::error::EngineError::factory(&config.name, err))?;

        let mut cache = TtlCache::new(capacity);
        if let Some(ttl) = default_ttl {
            cache = cache.with_default_ttl(ttl);
        }

        Ok(Arc::new(CacheModule {
            name: config.name.clone(),
            cache: Arc::new(cache),
        }))
    });
}

/// Cache module: registers a `TtlCache<String, Value>` under its name
pub struct CacheModule {
    name: String,
    cache: Arc<TtlCache<String, Value>>,
}

#[async_trait]
impl Module for CacheModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        app.registry()
            .register(&self.name, self.cache.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }
}
