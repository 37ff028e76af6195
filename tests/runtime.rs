use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use kube_serverless::{
    consts::{COLD_START_HEADER, DURATION_HEADER},
    function::runtime::Runtime,
    runtime::{
        self,
        event::Event,
        handler::{EchoHandler, Handler, HandlerConfig, HandlerError},
        state::DispatcherState,
        Dispatcher,
    },
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

struct Fixed(Value);

#[async_trait]
impl Handler for Fixed {
    async fn invoke(&self, _event: Event) -> Result<Value, HandlerError> {
        Ok(self.0.clone())
    }
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn invoke(&self, _event: Event) -> Result<Value, HandlerError> {
        Err(HandlerError::Failed {
            code: Some(1),
            message: String::from("boom"),
        })
    }
}

fn router_with(handler: impl Handler + 'static) -> (Router, Arc<Dispatcher>) {
    let dispatcher = Arc::new(Dispatcher::new(
        Box::new(handler),
        DispatcherState::new().unwrap(),
    ));
    (runtime::router(dispatcher.clone()), dispatcher)
}

async fn post(app: &Router, uri: &str, content_type: Option<&str>, body: &str) -> Response {
    let mut request = Request::post(uri);
    if let Some(content_type) = content_type {
        request = request.header(CONTENT_TYPE, content_type);
    }

    app.clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_str(&text(response).await).unwrap()
}

fn cold_start(response: &Response) -> &str {
    response.headers()[COLD_START_HEADER].to_str().unwrap()
}

#[tokio::test]
async fn health() {
    let (app, _) = router_with(EchoHandler);

    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "healthy"}));
}

#[tokio::test]
async fn first_invocation_is_the_only_cold_start() {
    let (app, dispatcher) = router_with(EchoHandler);

    let ready = json_body(get(&app, "/ready").await).await;
    assert_eq!(ready, json!({"status": "ready", "coldStart": true}));

    let first = post(&app, "/", None, "").await;
    assert_eq!(cold_start(&first), "true");

    for _ in 0..3 {
        let next = post(&app, "/", None, "").await;
        assert_eq!(cold_start(&next), "false");
    }

    let ready = json_body(get(&app, "/ready").await).await;
    assert_eq!(ready["coldStart"], false);
    assert_eq!(dispatcher.state().invocations(), 4);
}

#[tokio::test]
async fn echo_returns_the_event() {
    let (app, _) = router_with(EchoHandler);

    let response = post(
        &app,
        "/?name=a&name=b",
        Some("application/json"),
        r#"{"message": "hi"}"#,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(DURATION_HEADER));

    let event = json_body(response).await;
    assert_eq!(event["body"], json!({"message": "hi"}));
    assert_eq!(event["method"], "POST");
    assert_eq!(event["path"], "/");
    assert_eq!(event["query"], json!({"name": "a"}));
    assert_eq!(event["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn plain_values_are_serialized_with_success() {
    let (app, _) = router_with(Fixed(json!({"total": 42})));

    let response = post(&app, "/", None, "").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"total": 42}));
}

#[tokio::test]
async fn structured_responses_set_status_and_body() {
    let (app, _) = router_with(Fixed(json!({"statusCode": 201, "body": "created"})));

    let response = post(&app, "/", None, "").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(text(response).await, "created");

    let (app, _) = router_with(Fixed(json!({"statusCode": 404, "body": {"missing": true}})));

    let response = post(&app, "/", None, "").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({"missing": true}));
}

#[tokio::test]
async fn invalid_status_codes_are_plain_values() {
    let (app, _) = router_with(Fixed(json!({"statusCode": "teapot"})));

    let response = post(&app, "/", None, "").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"statusCode": "teapot"}));
}

#[tokio::test]
async fn handler_errors_are_faults() {
    let (app, dispatcher) = router_with(Failing);

    let response = post(&app, "/", None, "").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(cold_start(&response), "true");
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("boom"));
    assert_eq!(dispatcher.state().errors(), 1);
}

#[tokio::test]
async fn malformed_json_is_a_client_fault() {
    let (app, dispatcher) = router_with(EchoHandler);

    let response = post(&app, "/", Some("application/json"), "{not json").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(dispatcher.state().invocations(), 0);
}

#[tokio::test]
async fn metrics_are_scrapable() {
    let (app, _) = router_with(EchoHandler);
    post(&app, "/", None, "").await;

    let response = get(&app, "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let text = text(response).await;
    assert!(text.contains("function_invocations_total 1"));
    assert!(text.contains("function_cold_starts_total 1"));
    assert!(text.contains("function_cold_start 0"));
}

#[tokio::test]
async fn failed_load_falls_back_to_echo() {
    let directory = tempfile::tempdir().unwrap();

    let dispatcher = Dispatcher::load(HandlerConfig {
        function_name: String::from("f1"),
        code_path: directory.path().join("missing"),
        handler: String::from("index.handler"),
        runtime: Runtime::NodeJs18,
        timeout: Duration::from_secs(1),
    })
    .await
    .unwrap();

    assert!(dispatcher.state().is_cold());

    let app = runtime::router(Arc::new(dispatcher));
    let response = post(&app, "/", None, "plain text").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cold_start(&response), "true");
    assert_eq!(json_body(response).await["body"], "plain text");
}

#[cfg(unix)]
#[tokio::test]
async fn successful_load_consumes_cold_start() {
    use std::os::unix::fs::PermissionsExt;

    let directory = tempfile::tempdir().unwrap();
    let code_path = directory.path().join("main");
    std::fs::write(&code_path, "#!/bin/sh\ncat\n").unwrap();
    std::fs::set_permissions(&code_path, std::fs::Permissions::from_mode(0o755)).unwrap();

    let dispatcher = Dispatcher::load(HandlerConfig {
        function_name: String::from("f1"),
        code_path,
        handler: String::from("main"),
        runtime: Runtime::Go119,
        timeout: Duration::from_secs(10),
    })
    .await
    .unwrap();

    assert!(!dispatcher.state().is_cold());

    let app = runtime::router(Arc::new(dispatcher));
    let ready = json_body(get(&app, "/ready").await).await;
    assert_eq!(ready["coldStart"], false);

    let response = post(&app, "/", Some("application/json"), r#"{"n": 1}"#).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cold_start(&response), "false");
    assert_eq!(json_body(response).await["body"], json!({"n": 1}));
}
