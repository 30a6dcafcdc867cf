//! Config file loading and application merging
//!
//! A file either holds a single `WorkflowConfig` or an application wrapper
//! (`application.workflows[]`) referencing several workflow files. The
//! loader never mutates the file; it records the containing directory so
//! relative workflow references resolve correctly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{ApplicationConfig, ApplicationDocument, WorkflowConfig};

// =============================================================================
// Errors
// =============================================================================

/// Errors from config loading and merging
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config '{path}': {message}")]
    Io { path: String, message: String },

    /// File could not be parsed
    #[error("Failed to parse config '{path}': {message}")]
    Parse { path: String, message: String },

    /// Two files in an application define the same name
    #[error("{kind} name conflict: {name} defined in {first} and {second}")]
    NameConflict {
        kind: &'static str,
        name: String,
        first: String,
        second: String,
    },
}

// =============================================================================
// Loader
// =============================================================================

/// A parsed config file plus the directory it came from
#[derive(Debug, Clone)]
pub enum LoadedConfig {
    /// Single workflow config
    Workflow(WorkflowConfig),

    /// Application wrapper with its config directory for relative paths
    Application {
        config: ApplicationConfig,
        config_dir: PathBuf,
    },
}

/// Load a config file, detecting workflow vs application shape
///
/// A document with a non-empty `application.workflows[]` sequence is an
/// application; anything else is a single workflow config. `.json` files
/// parse as JSON, everything else as YAML.
pub fn load_file(path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    let probe: serde_json::Value = parse_document(path, &raw)?;
    let is_application = probe
        .pointer("/application/workflows")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|refs| !refs.is_empty());

    if is_application {
        let document: ApplicationDocument = from_value(path, probe)?;
        let config_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(LoadedConfig::Application {
            config: document.application,
            config_dir,
        })
    } else {
        let config: WorkflowConfig = from_value(path, probe)?;
        Ok(LoadedConfig::Workflow(config))
    }
}

/// Load a file that must be a single workflow config
pub fn load_workflow_file(path: impl AsRef<Path>) -> Result<WorkflowConfig, ConfigError> {
    match load_file(&path)? {
        LoadedConfig::Workflow(config) => Ok(config),
        LoadedConfig::Application { .. } => Err(ConfigError::Parse {
            path: path.as_ref().display().to_string(),
            message: "expected a workflow config, found an application config".to_string(),
        }),
    }
}

/// Parse a raw config string into a workflow config (YAML or JSON)
pub fn parse_workflow_str(raw: &str) -> Result<WorkflowConfig, ConfigError> {
    serde_yml::from_str(raw).map_err(|err| ConfigError::Parse {
        path: "<inline>".to_string(),
        message: err.to_string(),
    })
}

fn parse_document(path: &Path, raw: &str) -> Result<serde_json::Value, ConfigError> {
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let parsed = if is_json {
        serde_json::from_str(raw).map_err(|err| err.to_string())
    } else {
        serde_yml::from_str(raw).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

fn from_value<T: serde::de::DeserializeOwned>(
    path: &Path,
    value: serde_json::Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

// =============================================================================
// Application Merging
// =============================================================================

/// Load every referenced workflow file and union the results
///
/// Modules keep declared order across files. Any module, trigger, or
/// pipeline name collision fails the merge, naming both files. Duplicate
/// workflow types are allowed; the later file wins with a warning.
pub fn merge_application(
    app: &ApplicationConfig,
    config_dir: &Path,
) -> Result<WorkflowConfig, ConfigError> {
    let mut merged = WorkflowConfig::default();

    // Track which file introduced each name for collision reporting.
    let mut module_origin: BTreeMap<String, String> = BTreeMap::new();
    let mut trigger_origin: BTreeMap<String, String> = BTreeMap::new();
    let mut pipeline_origin: BTreeMap<String, String> = BTreeMap::new();

    for workflow_ref in &app.workflows {
        let path = config_dir.join(&workflow_ref.file);
        let config = load_workflow_file(&path)?;
        let file = workflow_ref.file.clone();

        for module in config.modules {
            if let Some(first) = module_origin.get(&module.name) {
                return Err(ConfigError::NameConflict {
                    kind: "module",
                    name: module.name,
                    first: first.clone(),
                    second: file,
                });
            }
            module_origin.insert(module.name.clone(), file.clone());
            merged.modules.push(module);
        }

        for (name, trigger) in config.triggers {
            if let Some(first) = trigger_origin.get(&name) {
                return Err(ConfigError::NameConflict {
                    kind: "trigger",
                    name,
                    first: first.clone(),
                    second: file,
                });
            }
            trigger_origin.insert(name.clone(), file.clone());
            merged.triggers.insert(name, trigger);
        }

        for (name, pipeline) in config.pipelines {
            if let Some(first) = pipeline_origin.get(&name) {
                return Err(ConfigError::NameConflict {
                    kind: "pipeline",
                    name,
                    first: first.clone(),
                    second: file,
                });
            }
            pipeline_origin.insert(name.clone(), file.clone());
            merged.pipelines.insert(name, pipeline);
        }

        for (kind, workflow) in config.workflows {
            if merged.workflows.contains_key(&kind) {
                tracing::warn!(workflow = %kind, file = %file, "workflow type redefined; later file wins");
            }
            merged.workflows.insert(kind, workflow);
        }
    }

    Ok(merged)
}
