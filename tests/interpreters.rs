//! Node and Python handlers, skipped when the interpreter is not installed.

use axum::{http::StatusCode, response::IntoResponse};
use kube_serverless::{
    function::runtime::Runtime,
    runtime::{
        event::Event,
        handler::{Handler, HandlerConfig, LoadError, ProcessHandler},
        Invocation,
    },
};
use serde_json::json;
use std::{path::Path, time::Duration};

async fn load(code_path: &Path, handler: &str, runtime: Runtime) -> Option<ProcessHandler> {
    let config = HandlerConfig {
        function_name: String::from("f1"),
        code_path: code_path.to_path_buf(),
        handler: handler.to_string(),
        runtime,
        timeout: Duration::from_secs(30),
    };

    match ProcessHandler::load(config).await {
        Ok(handler) => Some(handler),
        Err(LoadError::Interpreter { program, .. }) => {
            eprintln!("skipping: {program} is not installed");
            None
        }
        Err(error) => panic!("unexpected load error: {error}"),
    }
}

fn event() -> Event {
    Event {
        body: json!({"n": 1}),
        method: String::from("POST"),
        path: String::from("/"),
        ..Default::default()
    }
}

#[tokio::test]
async fn node_handler_uses_named_export() {
    let directory = tempfile::tempdir().unwrap();
    let code_path = directory.path().join("index.js");
    std::fs::write(
        &code_path,
        r#"
exports.handler = async () => ({ wrong: true });
exports.handle = async (event) => {
  console.log('inside handler');
  return { got: event.body };
};
"#,
    )
    .unwrap();

    let Some(handler) = load(&code_path, "index.handle", Runtime::NodeJs18).await else {
        return;
    };

    let result = handler.invoke(event()).await.unwrap();

    assert_eq!(result, json!({"got": {"n": 1}}));
}

#[tokio::test]
async fn python_handler_returns_structured_response() {
    let directory = tempfile::tempdir().unwrap();
    let code_path = directory.path().join("app.py");
    std::fs::write(
        &code_path,
        r#"
def handler(event):
    return {"wrong": True}

def main(event):
    print("inside handler")
    return {"statusCode": 201, "body": event["body"]}
"#,
    )
    .unwrap();

    let Some(handler) = load(&code_path, "app.main", Runtime::Python39).await else {
        return;
    };

    let result = handler.invoke(event()).await.unwrap();
    assert_eq!(result, json!({"statusCode": 201, "body": {"n": 1}}));

    let response = Invocation {
        outcome: Ok(result),
        duration: Duration::from_millis(5),
        cold_start: false,
    }
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
}
