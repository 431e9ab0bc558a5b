// HTTP route handlers for the coderun API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use coderun_common::{ExecutionRequest, LanguageSpec};
use coderun_engine::Transport;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::{metrics, AppState};

/// One row of GET /languages
#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub id: String,
    pub runtime: String,
    pub version: String,
    pub aliases: Vec<String>,
    pub preview: bool,
    pub simulated: bool,
}

impl From<&LanguageSpec> for LanguageInfo {
    fn from(spec: &LanguageSpec) -> Self {
        Self {
            id: spec.id.clone(),
            runtime: spec.runtime.clone(),
            version: spec.version.clone(),
            aliases: spec.aliases.clone(),
            preview: spec.preview,
            simulated: spec.simulator.is_some(),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// POST /execute - Run code remotely, falling back to local simulation
///
/// Execution failures are still 200 with `success: false`; only bad input
/// (400) and a missing endpoint list (500) change the status.
pub async fn execute<T: Transport + 'static>(
    State(state): State<Arc<AppState<T>>>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected malformed request body");
            metrics::record_rejected("malformed_body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.executor.execute(&request).await {
        Ok(result) => {
            let language = state
                .executor
                .registry()
                .lookup(&request.language)
                .map(|spec| spec.id.clone())
                .unwrap_or_else(|_| "unknown".to_string());

            metrics::record_execution(
                &language,
                &result.mode().to_string(),
                result.success,
                result.execution_time_ms as f64,
            );

            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            metrics::record_rejected(e.reason());
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                tracing::error!(error = %e, "Execution request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, e.to_string())
        }
    }
}

/// GET /languages - Active language table
pub async fn list_languages<T: Transport + 'static>(
    State(state): State<Arc<AppState<T>>>,
) -> Json<Vec<LanguageInfo>> {
    Json(
        state
            .executor
            .registry()
            .languages()
            .iter()
            .map(LanguageInfo::from)
            .collect(),
    )
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text format
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
