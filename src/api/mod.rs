//! REST surface of the control plane.

pub mod metrics;

use crate::{
    function::{Function, FunctionMetrics, InvocationAck},
    orchestrator::{Orchestrator, OrchestratorError, QuadrupleState},
    substrate::Substrate,
};
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use metrics::ApiMetrics;
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub struct ApiState<S> {
    pub orchestrator: Orchestrator<S>,
    pub metrics: ApiMetrics,
}

impl<S: Substrate> ApiState<S> {
    pub fn new(substrate: S) -> Result<Self, prometheus::Error> {
        Ok(Self {
            orchestrator: Orchestrator::new(substrate),
            metrics: ApiMetrics::new()?,
        })
    }
}

#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl<E: OrchestratorError> From<E> for ApiError {
    fn from(error: E) -> Self {
        let status_code = if error.is_not_found() {
            StatusCode::NOT_FOUND
        } else if error.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        Self::new(status_code, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            tracing::error!(status = %self.status_code, message = %self.message, "API error.");
        } else {
            tracing::debug!(status = %self.status_code, message = %self.message, "API error.");
        }

        (self.status_code, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn ready<S: Substrate>(State(state): State<Arc<ApiState<S>>>) -> Response {
    match state.orchestrator.ping().await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "error": error.to_string() })),
        )
            .into_response(),
    }
}

async fn list_functions<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<Vec<Function>>, ApiError> {
    Ok(Json(state.orchestrator.list_functions().await?))
}

async fn create_function<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Json(function): Json<Function>,
) -> Result<(StatusCode, Json<Function>), ApiError> {
    let name = function.name.clone();
    let result = state.orchestrator.create_function(function).await;
    state.metrics.record_deployment(&name, result.is_ok());

    Ok((StatusCode::CREATED, Json(result?)))
}

async fn get_function<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Path(name): Path<String>,
) -> Result<Json<Function>, ApiError> {
    Ok(Json(state.orchestrator.get_function(&name).await?))
}

async fn update_function<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Path(name): Path<String>,
    Json(function): Json<Function>,
) -> Result<Json<Function>, ApiError> {
    let result = state.orchestrator.update_function(&name, function).await;
    state.metrics.record_deployment(&name, result.is_ok());

    Ok(Json(result?))
}

async fn delete_function<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_function(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invoke_function<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Path(name): Path<String>,
    payload: Bytes,
) -> Result<Json<InvocationAck>, ApiError> {
    let started = Instant::now();
    let ack = state.orchestrator.invoke_function(&name, &payload).await?;

    // Only known functions get a series.
    state.metrics.record_invocation(&name);
    state.metrics.observe_duration(&name, started.elapsed());

    Ok(Json(ack))
}

async fn function_metrics<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Path(name): Path<String>,
) -> Json<FunctionMetrics> {
    Json(state.orchestrator.function_metrics(&name))
}

async fn probe_function<S: Substrate>(
    State(state): State<Arc<ApiState<S>>>,
    Path(name): Path<String>,
) -> Result<Json<QuadrupleState>, ApiError> {
    Ok(Json(state.orchestrator.probe_function(&name).await?))
}

async fn prometheus_metrics<S: Substrate>(State(state): State<Arc<ApiState<S>>>) -> Response {
    match state.metrics.encode() {
        Ok(text) => ([(CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to encode metrics.");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

pub fn router<S: Substrate>(state: Arc<ApiState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<S>))
        .route(
            "/api/v1/functions",
            get(list_functions::<S>).post(create_function::<S>),
        )
        .route(
            "/api/v1/functions/:name",
            get(get_function::<S>)
                .put(update_function::<S>)
                .delete(delete_function::<S>),
        )
        .route("/api/v1/functions/:name/invoke", post(invoke_function::<S>))
        .route("/api/v1/functions/:name/metrics", get(function_metrics::<S>))
        .route("/api/v1/functions/:name/resources", get(probe_function::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Served on its own port.
pub fn metrics_router<S: Substrate>(state: Arc<ApiState<S>>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics::<S>))
        .with_state(state)
}
