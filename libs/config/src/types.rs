//! Declarative configuration types
//!
//! These types are deserialized from YAML/JSON workflow definitions. The
//! free-form `config:` mapping stays a `serde_json::Value` tree; modules
//! project it into typed structs at the boundary of their own init.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Workflow Configuration
// =============================================================================

/// Root workflow configuration
///
/// A graph of named modules plus workflow handlers, triggers, and optional
/// standalone pipelines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    /// Module declarations, in order
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Mapping workflow-type → workflow config
    #[serde(default)]
    pub workflows: BTreeMap<String, serde_json::Value>,

    /// Mapping trigger-name → trigger config
    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerConfig>,

    /// Mapping pipeline-name → pipeline config
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineConfig>,
}

/// A single module declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleConfig {
    /// Unique module name within the config
    pub name: String,

    /// Factory key resolving the module implementation
    #[serde(rename = "type")]
    pub kind: String,

    /// Free-form module settings
    #[serde(default)]
    pub config: serde_json::Value,

    /// Names of modules this one depends on
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

/// A single trigger declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    /// Factory key resolving the trigger implementation
    #[serde(rename = "type")]
    pub kind: String,

    /// Free-form trigger settings
    #[serde(default)]
    pub config: serde_json::Value,
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Error strategy applied when a pipeline step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorStrategy {
    /// Return the error immediately
    #[default]
    #[serde(rename = "fail-fast")]
    FailFast,

    /// Log the error and run the next step
    #[serde(rename = "continue")]
    Continue,

    /// Record the error under the step's output and run the next step
    #[serde(rename = "record-error")]
    RecordError,
}

/// A named pipeline: an ordered list of typed steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Strategy for step failures
    #[serde(default, rename = "errorStrategy")]
    pub error_strategy: ErrorStrategy,

    /// Step declarations, in execution order
    pub steps: Vec<StepConfig>,
}

/// A single pipeline step declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepConfig {
    /// Unique step name within the pipeline
    pub name: String,

    /// Factory key resolving the step implementation
    #[serde(rename = "type")]
    pub kind: String,

    /// Free-form step settings; string leaves may contain templates
    #[serde(default)]
    pub config: serde_json::Value,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Multi-file application wrapper
///
/// Merging unions modules, triggers, and pipelines across the referenced
/// files and fails on any name collision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,

    /// Referenced workflow files, in merge order
    pub workflows: Vec<WorkflowRef>,
}

/// Reference to a workflow config file within an application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRef {
    /// File path, resolved relative to the application config's directory
    pub file: String,

    /// Optional display name for the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Wrapper document shape for application configs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApplicationDocument {
    pub application: ApplicationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_config_round_trip() {
        let yaml = r#"
modules:
  - name: server
    type: http.server
    config:
      address: ":8080"
  - name: router
    type: http.router
    dependsOn: [server]
workflows:
  http:
    routes: []
triggers:
  tick:
    type: schedule
    config:
      cron: "0 * * * * *"
pipelines:
  enrich:
    steps:
      - name: set-values
        type: step.set
        config:
          values:
            greeting: hello
"#;

        let config: WorkflowConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[1].depends_on, vec!["server"]);
        assert_eq!(config.triggers["tick"].kind, "schedule");
        assert_eq!(config.pipelines["enrich"].steps[0].kind, "step.set");

        // Dump and reload: same in-memory config.
        let dumped = serde_yml::to_string(&config).unwrap();
        let reloaded: WorkflowConfig = serde_yml::from_str(&dumped).unwrap();
        assert_eq!(config, reloaded);
    }

    #[test]
    fn test_error_strategy_names() {
        let strategies: Vec<ErrorStrategy> =
            serde_json::from_str(r#"["fail-fast", "continue", "record-error"]"#).unwrap();
        assert_eq!(
            strategies,
            vec![
                ErrorStrategy::FailFast,
                ErrorStrategy::Continue,
                ErrorStrategy::RecordError
            ]
        );
    }

    #[test]
    fn test_module_config_defaults() {
        let yaml = "name: cache\ntype: cache.memory\n";
        let module: ModuleConfig = serde_yml::from_str(yaml).unwrap();
        assert!(module.depends_on.is_empty());
        assert!(module.config.is_null());
    }
}
