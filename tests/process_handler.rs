#![cfg(unix)]

use kube_serverless::{
    function::runtime::Runtime,
    runtime::{
        event::Event,
        handler::{Handler, HandlerConfig, HandlerError, ProcessHandler},
    },
};
use serde_json::json;
use std::{os::unix::fs::PermissionsExt, path::Path, time::Duration};

fn write_executable(path: &Path, script: &str) {
    std::fs::write(path, script).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

async fn load(path: &Path, timeout: Duration) -> ProcessHandler {
    ProcessHandler::load(HandlerConfig {
        function_name: String::from("f1"),
        code_path: path.to_path_buf(),
        handler: String::from("main.handle"),
        runtime: Runtime::Go119,
        timeout,
    })
    .await
    .unwrap()
}

// Executables are all written before the first spawn so that no child inherits
// a write handle to a script that is about to be executed.
#[tokio::test]
async fn executables_receive_events_on_stdin() {
    let directory = tempfile::tempdir().unwrap();
    let echo = directory.path().join("echo");
    let export = directory.path().join("export");
    let failing = directory.path().join("failing");
    let silent = directory.path().join("silent");
    let garbage = directory.path().join("garbage");
    let slow = directory.path().join("slow");
    let chatty = directory.path().join("chatty");

    write_executable(&echo, "#!/bin/sh\necho 'handler log' >&2\ncat\n");
    write_executable(&export, "#!/bin/sh\ncat >/dev/null\nprintf '\"%s\"' \"$FUNCTION_EXPORT\"\n");
    write_executable(&failing, "#!/bin/sh\ncat >/dev/null\necho 'first' >&2\necho 'boom' >&2\nexit 3\n");
    write_executable(&silent, "#!/bin/sh\ncat >/dev/null\n");
    write_executable(&garbage, "#!/bin/sh\ncat >/dev/null\necho 'not json'\n");
    write_executable(&slow, "#!/bin/sh\nsleep 5\n");
    write_executable(
        &chatty,
        "#!/bin/sh\nhead -c 200000 /dev/zero | tr '\\0' ' '\ncat >/dev/null\nprintf '\"done\"'\n",
    );

    let event = Event {
        body: json!({"n": 1}),
        method: String::from("POST"),
        path: String::from("/"),
        ..Default::default()
    };

    let result = load(&echo, Duration::from_secs(10))
        .await
        .invoke(event.clone())
        .await
        .unwrap();
    assert_eq!(serde_json::from_value::<Event>(result).unwrap(), event);

    let result = load(&export, Duration::from_secs(10))
        .await
        .invoke(event.clone())
        .await
        .unwrap();
    assert_eq!(result, json!("handle"));

    let error = load(&failing, Duration::from_secs(10))
        .await
        .invoke(event.clone())
        .await
        .unwrap_err();
    match error {
        HandlerError::Failed { code, message } => {
            assert_eq!(code, Some(3));
            assert_eq!(message, "boom");
        }
        error => panic!("unexpected error: {error}"),
    }

    let result = load(&silent, Duration::from_secs(10))
        .await
        .invoke(event.clone())
        .await
        .unwrap();
    assert_eq!(result, serde_json::Value::Null);

    let error = load(&garbage, Duration::from_secs(10))
        .await
        .invoke(event.clone())
        .await
        .unwrap_err();
    assert!(matches!(error, HandlerError::InvalidOutput(_)));

    // Both pipes are filled past their buffer before the handler reads stdin.
    let large = Event {
        body: json!("x".repeat(200_000)),
        ..event.clone()
    };
    let result = load(&chatty, Duration::from_secs(10))
        .await
        .invoke(large)
        .await
        .unwrap();
    assert_eq!(result, json!("done"));

    let error = load(&slow, Duration::from_millis(200))
        .await
        .invoke(event)
        .await
        .unwrap_err();
    assert!(matches!(error, HandlerError::Timeout(_)));
}
