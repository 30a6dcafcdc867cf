//! Config schema validation
//!
//! Checks the declared module graph before the engine builds:
//! - unique, non-empty module names
//! - every `dependsOn` target declared, with typo suggestions
//! - known workflow types unless the caller opts into extra types
//! - no orphan pipeline references from triggers
//!
//! All violations are aggregated into one report rather than failing on the
//! first.

use std::collections::HashSet;

use crate::types::WorkflowConfig;

/// Workflow types the core handlers claim
pub const KNOWN_WORKFLOW_TYPES: &[&str] = &[
    "http",
    "messaging",
    "statemachine",
    "scheduler",
    "event",
    "integration",
];

/// Options for validation
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Additional workflow types registered by plugins
    pub extra_workflow_types: Vec<String>,
}

/// Aggregated validation outcome
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Human-readable violations, in discovery order
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Whether the config passed validation
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.errors.join("; "))
    }
}

/// Validate a workflow config
#[must_use]
pub fn validate_config(config: &WorkflowConfig) -> ValidationReport {
    validate_config_with_options(config, &ValidateOptions::default())
}

/// Validate a workflow config with extra allowed workflow types
#[must_use]
pub fn validate_config_with_options(
    config: &WorkflowConfig,
    options: &ValidateOptions,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    validate_modules(config, &mut report);
    validate_workflow_types(config, options, &mut report);
    validate_trigger_references(config, &mut report);
    validate_pipeline_steps(config, &mut report);

    report
}

fn validate_modules(config: &WorkflowConfig, report: &mut ValidationReport) {
    if config.modules.is_empty() {
        report.push("config declares no modules");
    }

    let mut seen = HashSet::new();
    for (idx, module) in config.modules.iter().enumerate() {
        if module.name.is_empty() {
            report.push(format!("modules[{idx}]: module name must not be empty"));
            continue;
        }
        if !seen.insert(module.name.as_str()) {
            report.push(format!("duplicate module name: {}", module.name));
        }
        if module.kind.is_empty() {
            report.push(format!("module '{}' has no type", module.name));
        }
    }

    let declared: HashSet<&str> = config.modules.iter().map(|m| m.name.as_str()).collect();
    for module in &config.modules {
        for dep in &module.depends_on {
            if !declared.contains(dep.as_str()) {
                let suggestion = find_similar(dep, &declared)
                    .map(|s| format!(" (did you mean '{s}'?)"))
                    .unwrap_or_default();
                report.push(format!(
                    "module '{}' depends on unknown module '{dep}'{suggestion}",
                    module.name
                ));
            }
        }
    }
}

fn validate_workflow_types(
    config: &WorkflowConfig,
    options: &ValidateOptions,
    report: &mut ValidationReport,
) {
    for kind in config.workflows.keys() {
        let known = KNOWN_WORKFLOW_TYPES.contains(&kind.as_str())
            || kind.starts_with("pipeline:")
            || options.extra_workflow_types.iter().any(|t| t == kind);
        if !known {
            report.push(format!("unknown workflow type: {kind}"));
        }
    }
}

fn validate_trigger_references(config: &WorkflowConfig, report: &mut ValidationReport) {
    for (name, trigger) in &config.triggers {
        if trigger.kind.is_empty() {
            report.push(format!("trigger '{name}' has no type"));
        }

        // Triggers that target a declared pipeline must reference one.
        if let Some(pipeline) = trigger.config.get("pipeline").and_then(|v| v.as_str()) {
            if !config.pipelines.contains_key(pipeline) {
                report.push(format!(
                    "trigger '{name}' references unknown pipeline '{pipeline}'"
                ));
            }
        }
    }
}

fn validate_pipeline_steps(config: &WorkflowConfig, report: &mut ValidationReport) {
    for (name, pipeline) in &config.pipelines {
        if pipeline.steps.is_empty() {
            report.push(format!("pipeline '{name}' has no steps"));
        }

        let mut seen = HashSet::new();
        for step in &pipeline.steps {
            if !seen.insert(step.name.as_str()) {
                report.push(format!(
                    "pipeline '{name}' declares duplicate step name '{}'",
                    step.name
                ));
            }
        }
    }
}

/// Find a declared name similar to `target` using Levenshtein distance
fn find_similar<'a>(target: &str, names: &HashSet<&'a str>) -> Option<&'a str> {
    let mut best: Option<&str> = None;
    let mut best_distance = usize::MAX;

    for &name in names {
        let distance = strsim::levenshtein(target, name);
        if distance < best_distance && distance <= 3 {
            best_distance = distance;
            best = Some(name);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModuleConfig, PipelineConfig, StepConfig, TriggerConfig};

    fn module(name: &str, deps: &[&str]) -> ModuleConfig {
        ModuleConfig {
            name: name.to_string(),
            kind: "http.server".to_string(),
            config: serde_json::Value::Null,
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = WorkflowConfig {
            modules: vec![module("server", &[]), module("router", &["server"])],
            ..Default::default()
        };

        let report = validate_config(&config);
        assert!(report.is_valid(), "unexpected errors: {report}");
    }

    #[test]
    fn test_empty_modules_invalid() {
        let report = validate_config(&WorkflowConfig::default());
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("no modules"));
    }

    #[test]
    fn test_unknown_dependency_named_in_errors() {
        let config = WorkflowConfig {
            modules: vec![module("api", &["nonexistent-server"])],
            ..Default::default()
        };

        let report = validate_config(&config);
        assert!(!report.is_valid());
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("nonexistent-server")));
    }

    #[test]
    fn test_typo_suggestion() {
        let config = WorkflowConfig {
            modules: vec![module("server", &[]), module("router", &["servre"])],
            ..Default::default()
        };

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("did you mean 'server'")));
    }

    #[test]
    fn test_duplicate_module_names_aggregate() {
        let config = WorkflowConfig {
            modules: vec![
                module("a", &[]),
                module("a", &[]),
                module("b", &["missing"]),
            ],
            ..Default::default()
        };

        let report = validate_config(&config);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_unknown_workflow_type() {
        let mut config = WorkflowConfig {
            modules: vec![module("a", &[])],
            ..Default::default()
        };
        config
            .workflows
            .insert("carrier-pigeon".to_string(), serde_json::Value::Null);

        let report = validate_config(&config);
        assert!(report.errors.iter().any(|e| e.contains("carrier-pigeon")));

        let options = ValidateOptions {
            extra_workflow_types: vec!["carrier-pigeon".to_string()],
        };
        assert!(validate_config_with_options(&config, &options).is_valid());
    }

    #[test]
    fn test_orphan_pipeline_reference() {
        let mut config = WorkflowConfig {
            modules: vec![module("a", &[])],
            ..Default::default()
        };
        config.triggers.insert(
            "hook".to_string(),
            TriggerConfig {
                kind: "event".to_string(),
                config: serde_json::json!({"pipeline": "ghost"}),
            },
        );

        let report = validate_config(&config);
        assert!(report.errors.iter().any(|e| e.contains("ghost")));
    }

    #[test]
    fn test_duplicate_step_names() {
        let mut config = WorkflowConfig {
            modules: vec![module("a", &[])],
            ..Default::default()
        };
        config.pipelines.insert(
            "p".to_string(),
            PipelineConfig {
                description: None,
                error_strategy: Default::default(),
                steps: vec![
                    StepConfig {
                        name: "s".to_string(),
                        kind: "step.set".to_string(),
                        config: serde_json::Value::Null,
                    },
                    StepConfig {
                        name: "s".to_string(),
                        kind: "step.set".to_string(),
                        config: serde_json::Value::Null,
                    },
                ],
            },
        );

        let report = validate_config(&config);
        assert!(report.errors.iter().any(|e| e.contains("duplicate step")));
    }
}
