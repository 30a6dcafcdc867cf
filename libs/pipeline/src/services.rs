//! Service traits consumed by steps
//!
//! Concrete backends (SQL engines, AI providers, sandboxes, artifact
//! storage) live outside the core; steps resolve them from the service
//! registry by name at build time and speak these traits.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A SQL-ish database service for `step.db_query` / `step.db_exec`
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query with positional parameter binding; returns rows
    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Map<String, Value>>, String>;

    /// Run a statement; returns affected row count
    async fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, String>;
}

/// An AI provider for the `step.ai_*` family
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Free-form completion
    async fn complete(&self, prompt: &str) -> Result<String, String>;

    /// Pick one of `labels` for `input`
    async fn classify(&self, input: &str, labels: &[String]) -> Result<String, String>;

    /// Extract structured fields from `input` following `schema`
    async fn extract(&self, input: &str, schema: &Value) -> Result<Value, String>;
}

/// A named action endpoint for `step.delegate`
#[async_trait]
pub trait ServiceDelegate: Send + Sync {
    /// Invoke one action with an input payload
    async fn call(&self, action: &str, input: &Value) -> Result<Value, String>;
}

/// A sandbox runner for the CI step family (`step.docker_run`,
/// `step.scan_code`)
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run one sandboxed action with its rendered config
    async fn run(&self, action: &str, config: &Value) -> Result<Value, String>;
}

/// Artifact storage for `step.artifact_upload` / `step.artifact_download`
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes under a name; returns the artifact id
    async fn upload(&self, name: &str, content: &[u8]) -> Result<String, String>;

    /// Fetch bytes by artifact id
    async fn download(&self, id: &str) -> Result<Vec<u8>, String>;
}
