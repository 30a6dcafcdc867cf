//! `step.db_query` and `step.db_exec`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::services::Database;
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::{optional_str, require_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.db_query", |config, env| {
        let service_name = require_str(&config.config, &config.name, "service")?;
        let database: Arc<dyn Database> = env.require(&service_name)?;
        Ok(Arc::new(DbStep {
            name: config.name.clone(),
            kind: DbKind::Query,
            database,
            statement: require_str(&config.config, &config.name, "query")?,
            params: config
                .config
                .get("params")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            target: optional_str(&config.config, "target"),
        }))
    });

    registry.register("step.db_exec", |config, env| {
        let service_name = require_str(&config.config, &config.name, "service")?;
        let database: Arc<dyn Database> = env.require(&service_name)?;
        Ok(Arc::new(DbStep {
            name: config.name.clone(),
            kind: DbKind::Exec,
            database,
            statement: require_str(&config.config, &config.name, "statement")?,
            params: config
                .config
                .get("params")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            target: optional_str(&config.config, "target"),
        }))
    });
}

enum DbKind {
    Query,
    Exec,
}

/// Executes against a named database service with parameter binding
pub struct DbStep {
    name: String,
    kind: DbKind,
    database: Arc<dyn Database>,
    statement: String,
    /// Positional parameters; templates render per execution
    params: Vec<Value>,
    target: Option<String>,
}

#[async_trait]
impl PipelineStep for DbStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        match self.kind {
            DbKind::Query => "step.db_query",
            DbKind::Exec => "step.db_exec",
        }
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let params: Result<Vec<Value>, _> = self
            .params
            .iter()
            .map(|param| render_config_value(param, &root))
            .collect();
        let params = params?;

        let output = match self.kind {
            DbKind::Query => {
                let rows = self
                    .database
                    .query(&self.statement, &params)
                    .await
                    .map_err(|err| PipelineError::step(&self.name, err))?;
                let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
                if let Some(target) = &self.target {
                    ctx.data.insert(target.clone(), Value::Array(rows.clone()));
                }
                serde_json::json!({"rows": rows, "count": rows.len()})
            }
            DbKind::Exec => {
                let affected = self
                    .database
                    .execute(&self.statement, &params)
                    .await
                    .map_err(|err| PipelineError::step(&self.name, err))?;
                if let Some(target) = &self.target {
                    ctx.data
                        .insert(target.clone(), serde_json::json!(affected));
                }
                serde_json::json!({"rowsAffected": affected})
            }
        };

        ctx.record_step_output(&self.name, output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakeDb;

    #[async_trait]
    impl Database for FakeDb {
        async fn query(
            &self,
            statement: &str,
            params: &[Value],
        ) -> Result<Vec<serde_json::Map<String, Value>>, String> {
            let mut row = serde_json::Map::new();
            row.insert("statement".to_string(), json!(statement));
            row.insert("param0".to_string(), params.first().cloned().unwrap_or(Value::Null));
            Ok(vec![row])
        }

        async fn execute(&self, _statement: &str, _params: &[Value]) -> Result<u64, String> {
            Ok(3)
        }
    }

    #[tokio::test]
    async fn test_query_renders_params_and_binds_rows() {
        let step = DbStep {
            name: "fetch".to_string(),
            kind: DbKind::Query,
            database: Arc::new(FakeDb),
            statement: "SELECT * FROM orders WHERE id = $1".to_string(),
            params: vec![json!("{{ .order_id }}")],
            target: Some("orders".to_string()),
        };

        let mut ctx = PipelineContext::from_value(json!({"order_id": "42"}));
        step.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.steps["fetch"]["count"], 1);
        assert_eq!(ctx.data["orders"][0]["param0"], "42");
    }

    #[tokio::test]
    async fn test_exec_reports_affected_rows() {
        let step = DbStep {
            name: "update".to_string(),
            kind: DbKind::Exec,
            database: Arc::new(FakeDb),
            statement: "UPDATE orders SET paid = true".to_string(),
            params: vec![],
            target: None,
        };

        let mut ctx = PipelineContext::default();
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.steps["update"]["rowsAffected"], 3);
    }
}
