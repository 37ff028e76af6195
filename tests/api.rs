use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::Service;
use kube_serverless::{
    api::{self, metrics::DEPLOYMENT_SUCCESS, ApiState},
    substrate::{memory::MemorySubstrate, Operation},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn state() -> Arc<ApiState<MemorySubstrate>> {
    Arc::new(ApiState::new(MemorySubstrate::new("functions")).unwrap())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, body)
}

fn f1() -> Value {
    json!({
        "name": "f1",
        "runtime": "python39",
        "handler": "app.main",
        "code": "def main(event):\n    return event\n",
        "minReplicas": 1,
        "maxReplicas": 5
    })
}

#[tokio::test]
async fn health_and_ready() {
    let app = api::router(state());

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy"}));

    let (status, body) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ready"}));
}

#[tokio::test]
async fn function_lifecycle() {
    let state = state();
    let app = api::router(state.clone());

    let (status, body) = send(&app, "POST", "/api/v1/functions", Some(f1())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "f1");
    assert_eq!(body["maxReplicas"], 5);
    assert_eq!(state.metrics.deployments("f1", DEPLOYMENT_SUCCESS), 1);

    let (status, body) = send(&app, "GET", "/api/v1/functions/f1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["runtime"], "python39");
    assert_eq!(body["handler"], "app.main");
    assert_eq!(body["minReplicas"], 1);
    assert_eq!(body["status"]["state"], "running");
    assert_eq!(body["status"]["endpoint"], "f1.functions.svc.cluster.local");

    let (status, body) = send(&app, "GET", "/api/v1/functions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let mut update = f1();
    update["handler"] = json!("app.other");
    let (status, _) = send(&app, "PUT", "/api/v1/functions/f1", Some(update)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/api/v1/functions/f1", None).await;
    assert_eq!(body["handler"], "app.other");

    let (status, body) = send(&app, "GET", "/api/v1/functions/f1/resources", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"state": "ready"}));

    let (status, body) = send(&app, "DELETE", "/api/v1/functions/f1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = send(&app, "GET", "/api/v1/functions/f1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("f1"));
}

#[tokio::test]
async fn invalid_name_is_a_bad_request() {
    let app = api::router(state());

    let mut function = f1();
    function["name"] = json!("Bad_Name");
    let (status, _) = send(&app, "POST", "/api/v1/functions", Some(function)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn substrate_failure_is_internal_and_reported() {
    let state = state();
    state
        .orchestrator
        .substrate()
        .fail_on::<Service>(Operation::Create)
        .await;
    let app = api::router(state.clone());

    let (status, body) = send(&app, "POST", "/api/v1/functions", Some(f1())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("network endpoint"));
    assert_eq!(state.metrics.deployments("f1", "failed"), 1);

    let (_, body) = send(&app, "GET", "/api/v1/functions/f1/resources", None).await;
    assert_eq!(body["state"], "partiallyCreated");
    assert_eq!(body["missing"], json!(["networkEndpoint", "autoscalingPolicy"]));
}

#[tokio::test]
async fn invoke_and_metrics() {
    let state = state();
    let app = api::router(state.clone());
    send(&app, "POST", "/api/v1/functions", Some(f1())).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/functions/f1/invoke",
        Some(json!({"n": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"function": "f1", "status": "invoked"}));
    assert_eq!(state.metrics.invocations("f1"), 1);

    let (status, _) = send(&app, "POST", "/api/v1/functions/ghost/invoke", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/api/v1/functions/f1/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invocations"], 100);
    assert_eq!(body["coldStarts"], 5);
    assert_eq!(body["avgDuration"], 0.25);

    let response = api::metrics_router(state)
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let text = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&text);
    assert!(text.contains(r#"function_invocations_total{function="f1"} 1"#));
    assert!(text.contains(r#"function_deployments_total{function="f1",status="success"} 1"#));
    assert!(!text.contains(r#"function="ghost""#));
}

#[tokio::test]
async fn malformed_spec_is_rejected_before_the_orchestrator() {
    let state = state();
    let app = api::router(state.clone());

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/functions",
        Some(json!({"runtime": "nodejs18"})),
    )
    .await;

    assert!(status.is_client_error());
    assert_eq!(state.metrics.deployments("", "failed"), 0);
}
