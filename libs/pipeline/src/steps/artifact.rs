//! CI/artifact step family: `step.artifact_upload`, `step.artifact_download`,
//! `step.docker_run`, `step.scan_code`
//!
//! All of these delegate to sandbox/artifact services registered by modules.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::services::{ArtifactStore, Sandbox};
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::{optional_str, require_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.artifact_upload", |config, env| {
        let store_name = require_str(&config.config, &config.name, "store")?;
        let store: Arc<dyn ArtifactStore> = env.require(&store_name)?;
        Ok(Arc::new(ArtifactUploadStep {
            name: config.name.clone(),
            store,
            artifact_name: require_str(&config.config, &config.name, "artifact")?,
            content: require_str(&config.config, &config.name, "content")?,
        }))
    });

    registry.register("step.artifact_download", |config, env| {
        let store_name = require_str(&config.config, &config.name, "store")?;
        let store: Arc<dyn ArtifactStore> = env.require(&store_name)?;
        Ok(Arc::new(ArtifactDownloadStep {
            name: config.name.clone(),
            store,
            id: require_str(&config.config, &config.name, "id")?,
            target: optional_str(&config.config, "target")
                .unwrap_or_else(|| "artifact".to_string()),
        }))
    });

    registry.register("step.docker_run", |config, env| sandbox_step(config, env, "docker_run"));
    registry.register("step.scan_code", |config, env| sandbox_step(config, env, "scan_code"));
}

fn sandbox_step(
    config: &weft_config::StepConfig,
    env: &crate::step::StepEnv,
    action: &'static str,
) -> Result<Arc<dyn PipelineStep>, PipelineError> {
    let sandbox_name = require_str(&config.config, &config.name, "sandbox")?;
    let sandbox: Arc<dyn Sandbox> = env.require(&sandbox_name)?;
    Ok(Arc::new(SandboxStep {
        name: config.name.clone(),
        sandbox,
        action,
        config: config.config.clone(),
    }))
}

// =============================================================================
// Artifact Steps
// =============================================================================

/// Stores rendered content and records the artifact id
pub struct ArtifactUploadStep {
    name: String,
    store: Arc<dyn ArtifactStore>,
    artifact_name: String,
    content: String,
}

#[async_trait]
impl PipelineStep for ArtifactUploadStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.artifact_upload"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let rendered = render_config_value(&Value::String(self.content.clone()), &root)?;
        let content = rendered
            .as_str()
            .map_or_else(|| rendered.to_string(), str::to_string);

        let id = self
            .store
            .upload(&self.artifact_name, content.as_bytes())
            .await
            .map_err(|err| PipelineError::step(&self.name, err))?;

        ctx.record_step_output(&self.name, serde_json::json!({"artifactId": id}))?;
        Ok(())
    }
}

/// Fetches an artifact into a data field
pub struct ArtifactDownloadStep {
    name: String,
    store: Arc<dyn ArtifactStore>,
    id: String,
    target: String,
}

#[async_trait]
impl PipelineStep for ArtifactDownloadStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.artifact_download"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let rendered = render_config_value(&Value::String(self.id.clone()), &root)?;
        let id = rendered
            .as_str()
            .map_or_else(|| rendered.to_string(), str::to_string);

        let content = self
            .store
            .download(&id)
            .await
            .map_err(|err| PipelineError::step(&self.name, err))?;

        let text = String::from_utf8_lossy(&content).into_owned();
        ctx.data.insert(self.target.clone(), Value::String(text));
        ctx.record_step_output(
            &self.name,
            serde_json::json!({"artifactId": id, "bytes": content.len()}),
        )?;
        Ok(())
    }
}

// =============================================================================
// Sandbox Steps
// =============================================================================

/// Runs one sandboxed action with the step's rendered config
pub struct SandboxStep {
    name: String,
    sandbox: Arc<dyn Sandbox>,
    action: &'static str,
    config: Value,
}

#[async_trait]
impl PipelineStep for SandboxStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        match self.action {
            "docker_run" => "step.docker_run",
            _ => "step.scan_code",
        }
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();
        let rendered = render_config_value(&self.config, &root)?;

        let result = self
            .sandbox
            .run(self.action, &rendered)
            .await
            .map_err(|err| PipelineError::step(&self.name, err))?;

        ctx.record_step_output(&self.name, result)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        artifacts: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ArtifactStore for MemoryStore {
        async fn upload(&self, name: &str, content: &[u8]) -> Result<String, String> {
            let mut artifacts = self.artifacts.lock().unwrap();
            artifacts.push((name.to_string(), content.to_vec()));
            Ok(format!("artifact-{}", artifacts.len()))
        }

        async fn download(&self, id: &str) -> Result<Vec<u8>, String> {
            let artifacts = self.artifacts.lock().unwrap();
            let index: usize = id
                .strip_prefix("artifact-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| format!("unknown artifact '{id}'"))?;
            artifacts
                .get(index - 1)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| format!("unknown artifact '{id}'"))
        }
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let store = Arc::new(MemoryStore::default());

        let upload = ArtifactUploadStep {
            name: "save".to_string(),
            store: store.clone(),
            artifact_name: "report".to_string(),
            content: "report for {{ .order_id }}".to_string(),
        };
        let mut ctx = PipelineContext::from_value(json!({"order_id": "42"}));
        upload.execute(&mut ctx).await.unwrap();

        let id = ctx.steps["save"]["artifactId"].as_str().unwrap().to_string();
        let download = ArtifactDownloadStep {
            name: "load".to_string(),
            store,
            id,
            target: "report".to_string(),
        };
        download.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.data["report"], "report for 42");
    }

    struct RecordingSandbox;

    #[async_trait]
    impl Sandbox for RecordingSandbox {
        async fn run(&self, action: &str, config: &Value) -> Result<Value, String> {
            Ok(json!({"action": action, "image": config.get("image")}))
        }
    }

    #[tokio::test]
    async fn test_sandbox_delegation() {
        let step = SandboxStep {
            name: "build".to_string(),
            sandbox: Arc::new(RecordingSandbox),
            action: "docker_run",
            config: json!({"sandbox": "ci", "image": "rust:{{ .toolchain }}"}),
        };

        let mut ctx = PipelineContext::from_value(json!({"toolchain": "1.83"}));
        step.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.steps["build"]["action"], "docker_run");
        assert_eq!(ctx.steps["build"]["image"], "rust:1.83");
    }
}
