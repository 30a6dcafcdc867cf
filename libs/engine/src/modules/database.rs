//! `database.memory` - fixture-grade in-memory database
//!
//! Collections of JSON rows keyed by name. `execute(collection, rows…)`
//! inserts, `query(collection, …)` returns every row. Real SQL backends are
//! external adapters behind the same `Database` trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use weft_core::{Application, LifecycleError, Module};
use weft_pipeline::Database;

use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("database.memory", |config| {
        Ok(Arc::new(MemoryDatabaseModule {
            name: config.name.clone(),
            database: Arc::new(MemoryDatabase::default()),
        }))
    });
}

/// In-memory collection store
#[derive(Default)]
pub struct MemoryDatabase {
    collections: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn query(
        &self,
        statement: &str,
        _params: &[Value],
    ) -> Result<Vec<Map<String, Value>>, String> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections.get(statement.trim()).cloned().unwrap_or_default())
    }

    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, String> {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        let rows = collections.entry(statement.trim().to_string()).or_default();

        let mut inserted = 0;
        for param in params {
            let Value::Object(row) = param else {
                return Err("rows must be objects".to_string());
            };
            rows.push(row.clone());
            inserted += 1;
        }
        Ok(inserted)
    }
}

/// Module registering the in-memory database under its name
pub struct MemoryDatabaseModule {
    name: String,
    database: Arc<MemoryDatabase>,
}

#[async_trait]
impl Module for MemoryDatabaseModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        let service: Arc<dyn Database> = self.database.clone();
        app.registry()
            .register(&self.name, service)
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }
}
