//! HTTP-facing steps: `step.request_parse`, `step.json_response`,
//! `step.http_call`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::{HttpResponseContext, PipelineContext};
use crate::error::PipelineError;
use crate::step::{PipelineStep, StepFactoryRegistry};
use crate::template::render_config_value;

use super::{optional_object, optional_str, require_str};

pub(crate) fn register(registry: &mut StepFactoryRegistry) {
    registry.register("step.request_parse", |config, _env| {
        let sources = config
            .config
            .get("sources")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec!["path".to_string(), "query".to_string(), "body".to_string()]);

        Ok(Arc::new(RequestParseStep {
            name: config.name.clone(),
            sources,
        }))
    });

    registry.register("step.json_response", |config, _env| {
        Ok(Arc::new(JsonResponseStep {
            name: config.name.clone(),
            status: config.config.get("status").cloned(),
            headers: optional_object(&config.config, "headers"),
            body: config.config.get("body").cloned(),
        }))
    });

    registry.register("step.http_call", |config, _env| {
        let url = require_str(&config.config, &config.name, "url")?;
        let timeout = weft_config::duration_field(&config.config, "timeout")
            .map_err(|err| PipelineError::config(&config.name, err.to_string()))?
            .unwrap_or(Duration::from_secs(30));

        Ok(Arc::new(HttpCallStep {
            name: config.name.clone(),
            client: reqwest::Client::new(),
            url,
            method: optional_str(&config.config, "method").unwrap_or_else(|| "GET".to_string()),
            headers: optional_object(&config.config, "headers"),
            body: config.config.get("body").cloned(),
            timeout,
            target: optional_str(&config.config, "target"),
        }))
    });
}

// =============================================================================
// step.request_parse
// =============================================================================

/// Lifts path/query/body from the request facet into `data`
pub struct RequestParseStep {
    name: String,
    sources: Vec<String>,
}

#[async_trait]
impl PipelineStep for RequestParseStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.request_parse"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(request) = ctx.request.clone() else {
            return Err(PipelineError::step(
                &self.name,
                "no request facet on this execution",
            ));
        };

        let mut lifted = Map::new();
        for source in &self.sources {
            match source.as_str() {
                "path" => lifted.extend(request.path_params.clone()),
                "query" => lifted.extend(request.query.clone()),
                "body" => {
                    if let Value::Object(fields) = &request.body {
                        lifted.extend(fields.clone());
                    }
                }
                other => {
                    return Err(PipelineError::step(
                        &self.name,
                        format!("unknown request source '{other}'"),
                    ));
                }
            }
        }

        ctx.merge_data(&lifted);
        ctx.record_step_output(&self.name, Value::Object(lifted))?;
        Ok(())
    }
}

// =============================================================================
// step.json_response
// =============================================================================

/// Populates the response facet; terminal in HTTP pipelines
pub struct JsonResponseStep {
    name: String,
    status: Option<Value>,
    headers: Map<String, Value>,
    /// Defaults to the whole `data` map
    body: Option<Value>,
}

#[async_trait]
impl PipelineStep for JsonResponseStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.json_response"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();

        let status = match &self.status {
            None => 200,
            Some(raw) => {
                let rendered = render_config_value(raw, &root)?;
                value_as_status(&rendered).ok_or_else(|| {
                    PipelineError::step(&self.name, format!("bad status value: {rendered}"))
                })?
            }
        };

        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        for (name, value) in &self.headers {
            let rendered = render_config_value(value, &root)?;
            let text = rendered
                .as_str()
                .map_or_else(|| rendered.to_string(), str::to_string);
            headers.push((name.clone(), text));
        }

        let body = match &self.body {
            Some(body) => render_config_value(body, &root)?,
            None => Value::Object(ctx.data.clone()),
        };

        ctx.response = Some(HttpResponseContext {
            status,
            headers,
            body: body.clone(),
        });
        ctx.record_step_output(&self.name, serde_json::json!({"status": status, "body": body}))?;
        Ok(())
    }
}

fn value_as_status(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|s| u16::try_from(s).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// =============================================================================
// step.http_call
// =============================================================================

/// Outbound HTTP request; records status, headers, and body
pub struct HttpCallStep {
    name: String,
    client: reqwest::Client,
    url: String,
    method: String,
    headers: Map<String, Value>,
    body: Option<Value>,
    timeout: Duration,
    /// Optional `data` field to copy the response body into
    target: Option<String>,
}

#[async_trait]
impl PipelineStep for HttpCallStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "step.http_call"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let root = ctx.template_root();

        let url = match render_config_value(&Value::String(self.url.clone()), &root)? {
            Value::String(url) => url,
            other => other.to_string(),
        };
        let method: reqwest::Method = self
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| PipelineError::step(&self.name, format!("bad method '{}'", self.method)))?;

        let mut request = self.client.request(method, &url).timeout(self.timeout);
        for (name, value) in &self.headers {
            let rendered = render_config_value(value, &root)?;
            let text = rendered
                .as_str()
                .map_or_else(|| rendered.to_string(), str::to_string);
            request = request.header(name, text);
        }
        if let Some(body) = &self.body {
            request = request.json(&render_config_value(body, &root)?);
        }

        let response = tokio::select! {
            () = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
            response = request.send() => {
                response.map_err(|err| PipelineError::step(&self.name, err))?
            }
        };

        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                headers.insert(name.to_string(), Value::String(text.to_string()));
            }
        }
        let raw = response
            .bytes()
            .await
            .map_err(|err| PipelineError::step(&self.name, err))?;
        let body: Value = serde_json::from_slice(&raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&raw).into_owned()));

        if let Some(target) = &self.target {
            ctx.data.insert(target.clone(), body.clone());
        }
        ctx.record_step_output(
            &self.name,
            serde_json::json!({
                "status": status,
                "headers": headers,
                "body": body,
            }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HttpRequestContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_request_parse_lifts_facets() {
        let step = RequestParseStep {
            name: "parse".to_string(),
            sources: vec!["path".to_string(), "body".to_string()],
        };

        let mut path_params = Map::new();
        path_params.insert("id".to_string(), json!("ORD-001"));
        let request = HttpRequestContext {
            method: "POST".to_string(),
            path: "/api/orders/{id}".to_string(),
            path_params,
            query: Map::new(),
            headers: Map::new(),
            body: json!({"total": 99.99}),
        };

        let mut ctx = PipelineContext::default().with_request(request);
        step.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.data["id"], "ORD-001");
        assert_eq!(ctx.data["total"], 99.99);
    }

    #[tokio::test]
    async fn test_request_parse_without_request_fails() {
        let step = RequestParseStep {
            name: "parse".to_string(),
            sources: vec!["body".to_string()],
        };
        let mut ctx = PipelineContext::default();
        assert!(step.execute(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_json_response_defaults() {
        let step = JsonResponseStep {
            name: "respond".to_string(),
            status: None,
            headers: Map::new(),
            body: None,
        };

        let mut ctx = PipelineContext::from_value(json!({"ok": true}));
        step.execute(&mut ctx).await.unwrap();

        let response = ctx.response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["ok"], true);
        assert!(response
            .headers
            .iter()
            .any(|(n, v)| n == "content-type" && v == "application/json"));
    }

    #[tokio::test]
    async fn test_json_response_templated_body() {
        let step = JsonResponseStep {
            name: "respond".to_string(),
            status: Some(json!(201)),
            headers: Map::new(),
            body: Some(json!({"id": "{{ .order_id }}"})),
        };

        let mut ctx = PipelineContext::from_value(json!({"order_id": "42"}));
        step.execute(&mut ctx).await.unwrap();

        let response = ctx.response.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body["id"], "42");
    }

    #[tokio::test]
    async fn test_http_call_records_status_and_body() {
        use axum::routing::get;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new()
                .route("/ping", get(|| async { axum::Json(json!({"pong": true})) }));
            axum::serve(listener, app).await.unwrap();
        });

        let step = HttpCallStep {
            name: "call".to_string(),
            client: reqwest::Client::new(),
            url: format!("http://{addr}/ping"),
            method: "GET".to_string(),
            headers: Map::new(),
            body: None,
            timeout: Duration::from_secs(5),
            target: Some("ping".to_string()),
        };

        let mut ctx = PipelineContext::default();
        step.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.steps["call"]["status"], 200);
        assert_eq!(ctx.data["ping"]["pong"], true);
    }
}
