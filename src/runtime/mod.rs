//! The per-function runtime process.
//!
//! Serves invocations over HTTP, hands each one to a [`Handler`] and reports
//! execution duration and cold start on every invocation response.

pub mod event;
pub mod handler;
pub mod state;

use crate::consts::{COLD_START_HEADER, DURATION_HEADER};
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use event::Event;
use handler::{EchoHandler, Handler, HandlerConfig, HandlerError, ProcessHandler};
use serde_json::{json, Value};
use state::DispatcherState;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tower_http::trace::TraceLayer;

const STATUS_CODE_FIELD: &str = "statusCode";
const BODY_FIELD: &str = "body";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Result of one invocation, before it is turned into a response.
#[derive(Debug)]
pub struct Invocation {
    pub outcome: Result<Value, HandlerError>,
    pub duration: Duration,
    pub cold_start: bool,
}

pub struct Dispatcher {
    handler: Box<dyn Handler>,
    state: DispatcherState,
}

impl Dispatcher {
    pub fn new(handler: Box<dyn Handler>, state: DispatcherState) -> Self {
        Self { handler, state }
    }

    /// Loads the function code. Any load failure is logged and the echo handler
    /// is used for the lifetime of the process.
    pub async fn load(config: HandlerConfig) -> Result<Self, prometheus::Error> {
        let state = DispatcherState::new()?;

        let handler: Box<dyn Handler> = match ProcessHandler::load(config).await {
            Ok(handler) => {
                tracing::info!(
                    runtime = %handler.config().runtime,
                    handler = %handler.config().handler,
                    "Function loaded."
                );
                state.mark_warm();
                Box::new(handler)
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to load function. Using echo handler.");
                Box::new(EchoHandler)
            }
        };

        Ok(Self::new(handler, state))
    }

    pub fn state(&self) -> &DispatcherState {
        &self.state
    }

    pub async fn dispatch(&self, event: Event) -> Invocation {
        let cold_start = self.state.take_cold_start();

        let started = Instant::now();
        let outcome = self.handler.invoke(event).await;
        let duration = started.elapsed();

        self.state.record_invocation(duration, outcome.is_err());

        if let Err(error) = &outcome {
            tracing::error!(%error, "Function invocation failed.");
        }

        Invocation {
            outcome,
            duration,
            cold_start,
        }
    }
}

/// An object with a valid `statusCode` is a structured response.
fn structured_response(result: &Value) -> Option<(StatusCode, Option<&Value>)> {
    let object = result.as_object()?;
    let status = object.get(STATUS_CODE_FIELD)?.as_u64()?;
    let status = StatusCode::from_u16(u16::try_from(status).ok()?).ok()?;

    Some((status, object.get(BODY_FIELD)))
}

fn result_response(result: Value) -> Response {
    match structured_response(&result) {
        Some((status, None | Some(Value::Null))) => status.into_response(),
        Some((status, Some(Value::String(body)))) => {
            (status, [(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body.clone()).into_response()
        }
        Some((status, Some(body))) => (status, Json(body.clone())).into_response(),
        None => (StatusCode::OK, Json(result)).into_response(),
    }
}

impl IntoResponse for Invocation {
    fn into_response(self) -> Response {
        let response = match self.outcome {
            Ok(result) => result_response(result),
            Err(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response(),
        };

        (
            [
                (
                    DURATION_HEADER,
                    format!("{:.3}", self.duration.as_secs_f64()),
                ),
                (COLD_START_HEADER, self.cold_start.to_string()),
            ],
            response,
        )
            .into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn ready(State(dispatcher): State<Arc<Dispatcher>>) -> Json<Value> {
    Json(json!({ "status": "ready", "coldStart": dispatcher.state().is_cold() }))
}

async fn invoke(State(dispatcher): State<Arc<Dispatcher>>, parts: Parts, body: Bytes) -> Response {
    let event = match Event::from_parts(&parts, &body) {
        Ok(event) => event,
        Err(error) => {
            tracing::debug!(%error, "Rejected invocation.");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response();
        }
    };

    dispatcher.dispatch(event).await.into_response()
}

async fn metrics(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    match dispatcher.state().encode_metrics() {
        Ok(text) => ([(CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics.");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", post(invoke))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_structured_responses() {
        let result = json!({"statusCode": 201, "body": "created"});
        let (status, body) = structured_response(&result).unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, Some(&json!("created")));

        assert!(structured_response(&json!({"statusCode": "201"})).is_none());
        assert!(structured_response(&json!({"statusCode": 70000})).is_none());
        assert!(structured_response(&json!({"statusCode": 42})).is_none());
        assert!(structured_response(&json!([1, 2])).is_none());
    }

    #[test]
    fn invocation_response_carries_metadata_headers() {
        let response = Invocation {
            outcome: Ok(json!({"a": 1})),
            duration: Duration::from_millis(1234),
            cold_start: true,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[DURATION_HEADER], "1.234");
        assert_eq!(response.headers()[COLD_START_HEADER], "true");
    }
}
