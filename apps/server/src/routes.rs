//! Management API routes

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use weft_config::{validate_config, WorkflowConfig};

use crate::error::ApiError;
use crate::state::ServerState;

/// Build the management router
pub fn management_routes(state: ServerState) -> Router {
    Router::new()
        .route("/api/workflow/config", get(get_config).put(put_config))
        .route("/api/workflow/reload", post(reload))
        .route("/api/workflow/status", get(status))
        .route("/api/workflow/validate", post(validate))
        .with_state(state)
}

async fn get_config(State(state): State<ServerState>) -> Json<WorkflowConfig> {
    Json(state.config().await)
}

async fn put_config(
    State(state): State<ServerState>,
    Json(raw): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let config: WorkflowConfig = serde_json::from_value(raw)
        .map_err(|err| ApiError::BadRequest(format!("malformed config: {err}")))?;
    state.set_config(config).await;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn reload(State(state): State<ServerState>) -> Result<Json<Value>, ApiError> {
    state
        .reload()
        .await
        .map_err(|err| ApiError::BadRequest(format!("reload failed: {err}")))?;
    Ok(Json(serde_json::json!({"success": true})))
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    #[serde(rename = "moduleCount")]
    module_count: usize,
    #[serde(rename = "pipelineCount")]
    pipeline_count: usize,
}

async fn status(State(state): State<ServerState>) -> Json<StatusResponse> {
    let response = match state.engine().await {
        Some(engine) => StatusResponse {
            status: engine.status().as_str().to_string(),
            module_count: engine.app().module_count(),
            pipeline_count: engine.pipelines().names().len(),
        },
        None => StatusResponse {
            status: "idle".to_string(),
            module_count: 0,
            pipeline_count: 0,
        },
    };
    Json(response)
}

#[derive(Serialize)]
struct ValidateResponse {
    valid: bool,
    errors: Vec<String>,
}

async fn validate(Json(raw): Json<Value>) -> Result<Json<ValidateResponse>, ApiError> {
    let config: WorkflowConfig = serde_json::from_value(raw)
        .map_err(|err| ApiError::BadRequest(format!("malformed config: {err}")))?;

    let report = validate_config(&config);
    Ok(Json(ValidateResponse {
        valid: report.is_valid(),
        errors: report.errors,
    }))
}
