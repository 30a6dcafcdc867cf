//! Integration workflow handler
//!
//! Builds named HTTP connectors (base URL, auth mode, header set, timeout,
//! private-IP policy) and exposes named integration steps invoked with
//! retry.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, WorkflowError};
use crate::handler::{WireContext, WorkflowHandler};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AuthConfig {
    /// `none`, `bearer`, or `basic`
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectorConfig {
    name: String,
    base_url: String,
    #[serde(default)]
    auth: Option<AuthConfig>,
    #[serde(default)]
    headers: HashMap<String, String>,
    /// Duration string, default 30s
    #[serde(default)]
    timeout: Option<String>,
    /// Allow targets on loopback/private ranges
    #[serde(default)]
    allow_private: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionConfig {
    method: String,
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepConfig {
    name: String,
    connector: String,
    action: ActionConfig,
    #[serde(default)]
    max_retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntegrationWorkflowConfig {
    #[serde(default)]
    connectors: Vec<ConnectorConfig>,
    #[serde(default)]
    steps: Vec<StepConfig>,
}

// =============================================================================
// Connector
// =============================================================================

struct HttpConnector {
    client: reqwest::Client,
    base_url: String,
    auth: AuthConfig,
    headers: HashMap<String, String>,
}

impl HttpConnector {
    fn build(config: &ConnectorConfig) -> Result<Self, String> {
        let url = reqwest::Url::parse(&config.base_url)
            .map_err(|err| format!("bad base url '{}': {err}", config.base_url))?;

        if !config.allow_private {
            check_public_host(&url)?;
        }

        let timeout = match &config.timeout {
            Some(text) => {
                weft_config::parse_duration(text).map_err(|err| err.to_string())?
            }
            None => Duration::from_secs(30),
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| err.to_string())?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone().unwrap_or_default(),
            headers: config.headers.clone(),
        })
    }

    async fn call(&self, action: &ActionConfig, path: &str) -> Result<Value, String> {
        let method: reqwest::Method = action
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| format!("bad method '{}'", action.method))?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.request(method, &url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        match self.auth.kind.as_deref() {
            Some("bearer") => {
                if let Some(token) = &self.auth.token {
                    request = request.bearer_auth(token);
                }
            }
            Some("basic") => {
                if let Some(username) = &self.auth.username {
                    request = request.basic_auth(username, self.auth.password.as_ref());
                }
            }
            _ => {}
        }

        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        let raw = response.bytes().await.map_err(|err| err.to_string())?;
        let body: Value = serde_json::from_slice(&raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&raw).into_owned()));

        if status >= 500 {
            return Err(format!("upstream returned {status}"));
        }
        Ok(serde_json::json!({"status": status, "body": body}))
    }
}

/// Reject loopback/private targets unless the connector opts in
fn check_public_host(url: &reqwest::Url) -> Result<(), String> {
    let Some(host) = url.host_str() else {
        return Err("base url has no host".to_string());
    };
    if host.eq_ignore_ascii_case("localhost") {
        return Err(format!("private target '{host}' not allowed"));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        let private = match ip {
            IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_loopback(),
        };
        if private {
            return Err(format!("private target '{host}' not allowed"));
        }
    }
    Ok(())
}

// =============================================================================
// Handler
// =============================================================================

struct IntegrationStep {
    connector: Arc<HttpConnector>,
    action: ActionConfig,
    max_retries: u32,
}

/// Handler for the `integration` workflow type
pub struct IntegrationWorkflowHandler {
    steps: Mutex<HashMap<String, Arc<IntegrationStep>>>,
}

impl Default for IntegrationWorkflowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrationWorkflowHandler {
    /// Create the handler
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WorkflowHandler for IntegrationWorkflowHandler {
    fn name(&self) -> &str {
        "integration"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "integration"
    }

    async fn configure(&self, _ctx: &WireContext, config: &Value) -> Result<(), EngineError> {
        let config: IntegrationWorkflowConfig = serde_json::from_value(config.clone())
            .map_err(|err| EngineError::wiring("integration", err))?;

        let mut connectors = HashMap::new();
        for connector_config in &config.connectors {
            let connector = HttpConnector::build(connector_config)
                .map_err(|err| EngineError::wiring("integration", err))?;
            connectors.insert(connector_config.name.clone(), Arc::new(connector));
        }

        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        for step in &config.steps {
            let connector = connectors.get(&step.connector).cloned().ok_or_else(|| {
                EngineError::wiring(
                    "integration",
                    format!("step '{}' references unknown connector '{}'", step.name, step.connector),
                )
            })?;
            steps.insert(
                step.name.clone(),
                Arc::new(IntegrationStep {
                    connector,
                    action: step.action.clone(),
                    max_retries: step.max_retries.unwrap_or(2),
                }),
            );
        }

        Ok(())
    }

    /// Direct invocation: `action` is a step name; `{param}` placeholders in
    /// the step path fill from `data`
    async fn execute(
        &self,
        _kind: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, WorkflowError> {
        let step = {
            let steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
            steps.get(action).cloned()
        }
        .ok_or_else(|| WorkflowError::NotFound(format!("no integration step '{action}'")))?;

        let path = fill_path(&step.action.path, &data);

        let mut delay = Duration::from_millis(100);
        let mut last_error = String::new();
        for attempt in 0..=step.max_retries {
            match step.connector.call(&step.action, &path).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    tracing::debug!(step = action, attempt, error = %err, "integration call failed");
                    last_error = err;
                }
            }
            if attempt < step.max_retries {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(WorkflowError::Internal(format!(
            "integration step '{action}' failed: {last_error}"
        )))
    }
}

/// Replace `{param}` placeholders from the invocation data
fn fill_path(path: &str, data: &Value) -> String {
    let mut out = path.to_string();
    if let Value::Object(fields) = data {
        for (key, value) in fields {
            let placeholder = format!("{{{key}}}");
            if out.contains(&placeholder) {
                let text = value
                    .as_str()
                    .map_or_else(|| value.to_string(), str::to_string);
                out = out.replace(&placeholder, &text);
            }
        }
    }
    out
}
