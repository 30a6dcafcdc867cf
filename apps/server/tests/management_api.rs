//! Management API scenarios: config replacement, reload, validation.

use serde_json::{json, Value};

use weft_server::{routes, ServerState};

async fn serve_management() -> (String, ServerState) {
    let state = ServerState::with_defaults();
    let app = routes::management_routes(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn test_put_config_then_reload_then_get() {
    let (base, _state) = serve_management().await;
    let client = reqwest::Client::new();

    // Initially empty.
    let initial: Value = client
        .get(format!("{base}/api/workflow/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(initial["modules"].as_array().unwrap().len(), 0);

    let config = json!({
        "modules": [
            {"name": "bus", "type": "messaging.broker"},
            {"name": "cache", "type": "cache.memory"},
            {"name": "orders-sm", "type": "statemachine.engine"}
        ]
    });
    let put = client
        .put(format!("{base}/api/workflow/config"))
        .json(&config)
        .send()
        .await
        .unwrap();
    assert_eq!(put.status().as_u16(), 200);

    let reload = client
        .post(format!("{base}/api/workflow/reload"))
        .send()
        .await
        .unwrap();
    assert_eq!(reload.status().as_u16(), 200);

    // The three modules come back in declared order.
    let fetched: Value = client
        .get(format!("{base}/api/workflow/config"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let modules = fetched["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 3);
    assert_eq!(modules[0]["name"], "bus");
    assert_eq!(modules[1]["name"], "cache");
    assert_eq!(modules[2]["name"], "orders-sm");

    let status: Value = client
        .get(format!("{base}/api/workflow/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "running");
    assert_eq!(status["moduleCount"], 3);
}

#[tokio::test]
async fn test_malformed_config_is_rejected() {
    let (base, _state) = serve_management().await;
    let client = reqwest::Client::new();

    // Structurally wrong: modules must be a sequence.
    let put = client
        .put(format!("{base}/api/workflow/config"))
        .json(&json!({"modules": "not-a-list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(put.status().as_u16(), 400);

    // Not JSON at all.
    let put = client
        .put(format!("{base}/api/workflow/config"))
        .header("content-type", "application/json")
        .body("{nope")
        .send()
        .await
        .unwrap();
    assert_eq!(put.status().as_u16(), 400);
}

#[tokio::test]
async fn test_validate_reports_missing_dependency() {
    let (base, _state) = serve_management().await;
    let client = reqwest::Client::new();

    let response: Value = client
        .post(format!("{base}/api/workflow/validate"))
        .json(&json!({
            "modules": [
                {"name": "api", "type": "http.server", "dependsOn": ["nonexistent-server"]}
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["valid"], false);
    let errors = response["errors"].as_array().unwrap();
    assert!(errors
        .iter()
        .any(|e| e.as_str().unwrap().contains("nonexistent-server")));
}

#[tokio::test]
async fn test_validate_rejects_empty_modules() {
    let (base, _state) = serve_management().await;
    let client = reqwest::Client::new();

    let response: Value = client
        .post(format!("{base}/api/workflow/validate"))
        .json(&json!({"modules": []}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["valid"], false);
}

#[tokio::test]
async fn test_reload_failure_keeps_previous_engine() {
    let (base, state) = serve_management().await;
    let client = reqwest::Client::new();

    // Stand up a working engine first.
    client
        .put(format!("{base}/api/workflow/config"))
        .json(&json!({"modules": [{"name": "bus", "type": "messaging.broker"}]}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/workflow/reload"))
        .send()
        .await
        .unwrap();
    assert!(state.engine().await.is_some());

    // A config with an unknown module type fails the rebuild.
    client
        .put(format!("{base}/api/workflow/config"))
        .json(&json!({"modules": [{"name": "x", "type": "quantum.entangler"}]}))
        .send()
        .await
        .unwrap();
    let reload = client
        .post(format!("{base}/api/workflow/reload"))
        .send()
        .await
        .unwrap();
    assert_eq!(reload.status().as_u16(), 400);

    // The previous engine is still there.
    assert!(state.engine().await.is_some());
}

#[tokio::test]
async fn test_reload_start_failure_keeps_previous_engine() {
    let (base, state) = serve_management().await;
    let client = reqwest::Client::new();

    client
        .put(format!("{base}/api/workflow/config"))
        .json(&json!({"modules": [{"name": "bus", "type": "messaging.broker"}]}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/workflow/reload"))
        .send()
        .await
        .unwrap();
    assert!(state.engine().await.is_some());

    // Occupy a port so the replacement builds fine but fails to start.
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = occupied.local_addr().unwrap();

    client
        .put(format!("{base}/api/workflow/config"))
        .json(&json!({
            "modules": [
                {"name": "server", "type": "http.server", "config": {"address": addr.to_string()}}
            ]
        }))
        .send()
        .await
        .unwrap();
    let reload = client
        .post(format!("{base}/api/workflow/reload"))
        .send()
        .await
        .unwrap();
    assert_eq!(reload.status().as_u16(), 400);

    // The previous engine was never swapped out and keeps running.
    let status: Value = client
        .get(format!("{base}/api/workflow/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "running");
    assert_eq!(status["moduleCount"], 1);
}
