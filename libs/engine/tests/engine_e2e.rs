//! End-to-end engine scenarios: build a config, start the engine, drive it
//! over real HTTP, and observe results.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use weft_config::parse_workflow_str;
use weft_engine::{Engine, EngineBuilder, EngineError, HttpServerHandle, WorkflowError};

async fn build(yaml: &str) -> Engine {
    let config = parse_workflow_str(yaml).unwrap();
    EngineBuilder::new()
        .with_default_handlers()
        .with_default_triggers()
        .build_from_config(config)
        .await
        .unwrap()
}

fn server_addr(engine: &Engine, module: &str) -> String {
    let handle: Arc<HttpServerHandle> = engine.app().registry().get(module).unwrap();
    format!("http://{}", handle.local_addr().unwrap())
}

#[tokio::test]
async fn test_http_only_workflow() {
    let engine = build(
        r#"
modules:
  - name: server
    type: http.server
    config:
      address: "127.0.0.1:0"
      router: router
  - name: router
    type: http.router
  - name: test-handler
    type: http.handler
    config:
      contentType: application/json
workflows:
  http:
    router: router
    routes:
      - method: POST
        path: /api/test
        handler: test-handler
"#,
    )
    .await;
    engine.start().await.unwrap();

    let base = server_addr(&engine, "server");
    let response = reqwest::Client::new()
        .post(format!("{base}/api/test"))
        .json(&json!({"hello": "world"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["handler"], "test-handler");
    assert_eq!(body["status"], "success");

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_order_state_machine_over_http() {
    let engine = build(
        r#"
modules:
  - name: server
    type: http.server
    config:
      address: "127.0.0.1:0"
      router: router
  - name: router
    type: http.router
  - name: orders-sm
    type: statemachine.engine
workflows:
  http:
    router: router
    routes:
      - method: POST
        path: /api/orders
        workflow: statemachine
        action: create
        status: 201
      - method: PUT
        path: /api/orders/{id}/validate
        workflow: statemachine
        action: validate
      - method: PUT
        path: /api/orders/{id}/store
        workflow: statemachine
        action: store
      - method: PUT
        path: /api/orders/{id}/notify
        workflow: statemachine
        action: notify
      - method: GET
        path: /api/orders/{id}
        workflow: statemachine
        action: get
  statemachine:
    engine: orders-sm
    definitions:
      - name: order
        initialState: received
        states:
          received: {}
          validated: {}
          stored: {}
          notified:
            isFinal: true
          failed:
            isFinal: true
            isError: true
        transitions:
          validate:
            fromState: received
            toState: validated
          store:
            fromState: validated
            toState: stored
          notify:
            fromState: stored
            toState: notified
          fail_validation:
            fromState: received
            toState: failed
"#,
    )
    .await;
    engine.start().await.unwrap();

    let base = server_addr(&engine, "server");
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{base}/api/orders"))
        .json(&json!({"id": "ORD-001", "customer": "Alice", "total": 99.99}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);

    for transition in ["validate", "store", "notify"] {
        let response = client
            .put(format!("{base}/api/orders/ORD-001/{transition}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "transition {transition}");
    }

    let fetched: Value = client
        .get(format!("{base}/api/orders/ORD-001"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["state"], "notified");

    // From a final state every further transition is a 400.
    let rejected = client
        .put(format!("{base}/api/orders/ORD-001/validate"))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status().as_u16(), 400);
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["success"], false);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_order_is_not_found() {
    let engine = build(
        r#"
modules:
  - name: orders-sm
    type: statemachine.engine
workflows:
  statemachine:
    engine: orders-sm
    definitions:
      - name: order
        initialState: received
        states:
          received: {}
          validated: {}
        transitions:
          validate:
            fromState: received
            toState: validated
"#,
    )
    .await;

    let err = engine
        .trigger_workflow("statemachine", "validate", json!({"id": "ghost"}))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    // Unknown transition names are mentioned in the error.
    engine
        .trigger_workflow("statemachine", "create", json!({"id": "ORD-1"}))
        .await
        .unwrap();
    let err = engine
        .trigger_workflow("statemachine", "launch", json!({"id": "ORD-1"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("launch"));
}

#[tokio::test]
async fn test_cross_pipeline_call() {
    let engine = build(
        r#"
modules:
  - name: bus
    type: messaging.broker
pipelines:
  validate:
    steps:
      - name: call-enrich
        type: step.workflow_call
        config:
          pipeline: enrich
          input:
            raw_id: "{{ .order_id }}"
          output_mapping:
            enriched_id: enriched_id
  enrich:
    steps:
      - name: set-enriched
        type: step.set
        config:
          values:
            enriched_id: "ENRICHED-{{ .raw_id }}"
"#,
    )
    .await;

    let result = engine
        .trigger_workflow("pipeline:validate", "", json!({"order_id": "42"}))
        .await
        .unwrap();
    assert_eq!(result["enriched_id"], "ENRICHED-42");
}

#[tokio::test]
async fn test_lifecycle_events_reach_the_broker() {
    let engine = build(
        r#"
modules:
  - name: bus
    type: messaging.broker
pipelines:
  noop:
    steps:
      - name: seed
        type: step.set
        config:
          values:
            done: true
"#,
    )
    .await;

    let broker: weft_broker::InProcessBroker = engine.app().registry().get("bus").unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    broker
        .subscribe(
            "workflow.completed",
            Arc::new(weft_broker::FnHandler(move |_t, payload: Vec<u8>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(payload);
                    Ok(())
                }
            })),
        )
        .unwrap();

    engine
        .trigger_workflow("pipeline:noop", "", json!({}))
        .await
        .unwrap();

    let mut delivered = false;
    for _ in 0..40 {
        if !seen.lock().unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(delivered, "workflow.completed never published");
    assert_eq!(engine.metrics().get("workflow.completed"), 1);
}

#[tokio::test]
async fn test_schedule_trigger_dispatches() {
    let engine = build(
        r#"
modules:
  - name: bus
    type: messaging.broker
triggers:
  tick:
    type: schedule
    config:
      cron: "* * * * * *"
      workflow: "pipeline:tick"
pipelines:
  tick:
    steps:
      - name: mark
        type: step.set
        config:
          values:
            ticked: true
"#,
    )
    .await;
    engine.start().await.unwrap();

    let mut fired = false;
    for _ in 0..30 {
        if engine.metrics().get("workflow.completed") > 0 {
            fired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    engine.stop().await.unwrap();
    assert!(fired, "schedule trigger never dispatched");
}

#[tokio::test]
async fn test_event_trigger_dispatches_from_topic() {
    let engine = build(
        r#"
modules:
  - name: bus
    type: messaging.broker
triggers:
  on-order:
    type: event
    config:
      broker: bus
      topic: orders.created
      workflow: "pipeline:react"
pipelines:
  react:
    steps:
      - name: mark
        type: step.set
        config:
          values:
            reacted: true
"#,
    )
    .await;
    engine.start().await.unwrap();

    let broker: weft_broker::InProcessBroker = engine.app().registry().get("bus").unwrap();
    broker
        .producer()
        .send_message("orders.created", br#"{"id":"ORD-9"}"#)
        .unwrap();

    let mut fired = false;
    for _ in 0..40 {
        if engine.metrics().get("workflow.completed") > 0 {
            fired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    engine.stop().await.unwrap();
    assert!(fired, "event trigger never dispatched");
}

#[tokio::test]
async fn test_unknown_module_type_is_fatal() {
    let config = parse_workflow_str(
        "modules:\n  - name: mystery\n    type: quantum.entangler\n",
    )
    .unwrap();

    let err = EngineBuilder::new()
        .with_default_handlers()
        .build_from_config(config)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownModuleType(_)));
}

#[tokio::test]
async fn test_dependency_cycle_is_fatal() {
    let config = parse_workflow_str(
        r#"
modules:
  - name: a
    type: cache.memory
    dependsOn: [b]
  - name: b
    type: cache.memory
    dependsOn: [a]
"#,
    )
    .unwrap();

    let err = EngineBuilder::new()
        .build_from_config(config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[tokio::test]
async fn test_empty_config_fails_validation() {
    let err = EngineBuilder::new()
        .build_from_config(weft_config::WorkflowConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_unclaimed_workflow_type_is_fatal() {
    let config = parse_workflow_str(
        r#"
modules:
  - name: bus
    type: messaging.broker
workflows:
  messaging:
    broker: bus
"#,
    )
    .unwrap();

    // No default handlers registered: the declared type has no claimant.
    let err = EngineBuilder::new()
        .build_from_config(config)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownWorkflowType(_)));
}

#[tokio::test]
async fn test_secret_expansion_reaches_module_configs() {
    std::env::set_var("WEFT_E2E_CAPACITY", "64");
    let engine = build(
        r#"
modules:
  - name: small-cache
    type: cache.memory
    config:
      capacity: 8
  - name: bus
    type: messaging.broker
    config:
      note: "capacity is ${WEFT_E2E_CAPACITY}"
"#,
    )
    .await;

    // Expansion happens before construction; the engine simply builds.
    assert_eq!(engine.app().module_count(), 2);
}

#[tokio::test]
async fn test_dynamic_component_binds_as_service() {
    use async_trait::async_trait;
    use serde_json::Map;
    use weft_engine::Component;

    struct EchoComponent;

    #[async_trait]
    impl Component for EchoComponent {
        async fn execute(&self, params: &Value) -> Result<Map<String, Value>, String> {
            let mut out = Map::new();
            out.insert("echo".to_string(), params.clone());
            Ok(out)
        }
    }

    let builder = EngineBuilder::new()
        .with_default_handlers()
        .with_dynamic_components();
    builder
        .dynamic_registry()
        .register("echo-v1", Arc::new(EchoComponent));

    let config = parse_workflow_str(
        r#"
modules:
  - name: echo
    type: dynamic.component
    config:
      component: echo-v1
"#,
    )
    .unwrap();
    let engine = builder.build_from_config(config).await.unwrap();

    let component: Arc<dyn Component> = engine.app().registry().get("echo").unwrap();
    let result = component.execute(&json!({"ping": 1})).await.unwrap();
    assert_eq!(result["echo"]["ping"], 1);
}

#[tokio::test]
async fn test_integration_step_calls_connector() {
    use axum::routing::get;

    // A stand-in upstream service.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/v1/orders/{id}",
            get(|axum::extract::Path(id): axum::extract::Path<String>| async move {
                axum::Json(json!({"order": id, "paid": true}))
            }),
        );
        axum::serve(listener, app).await.unwrap();
    });

    let engine = build(&format!(
        r#"
modules:
  - name: bus
    type: messaging.broker
workflows:
  integration:
    connectors:
      - name: billing
        baseUrl: "http://{upstream}"
        allowPrivate: true
        timeout: "5s"
    steps:
      - name: fetch-order
        connector: billing
        action:
          method: GET
          path: /v1/orders/{{id}}
"#
    ))
    .await;

    let result = engine
        .trigger_workflow("integration", "fetch-order", json!({"id": "ORD-7"}))
        .await
        .unwrap();
    assert_eq!(result["status"], 200);
    assert_eq!(result["body"]["order"], "ORD-7");
}
