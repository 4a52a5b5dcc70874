//! Route handlers for the control plane (§4.8).

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::RunManagerError;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub workflows: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub accepted: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `POST /run`: 202 on accept, 409 while one is already in progress, 400 on
/// unknown/duplicate workflow names.
pub async fn run_handler(State(state): State<AppState>, Json(request): Json<RunRequest>) -> Response {
    match state.run_manager.start(request.workflows.clone(), CancellationToken::new()) {
        Ok(_handle) => (
            StatusCode::ACCEPTED,
            Json(RunAccepted {
                accepted: request.workflows,
            }),
        )
            .into_response(),
        Err(RunManagerError::RunInProgress) => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: RunManagerError::RunInProgress.to_string(),
            }),
        )
            .into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(ErrorBody { error: err.to_string() })).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub pbs: PbsStatus,
    pub run: RunView,
    pub next_run: Option<chrono::DateTime<chrono::Local>>,
    pub build: super::state::BuildInfo,
}

#[derive(Debug, Serialize)]
pub struct PbsStatus {
    /// Last-seen status line of the `PowerOn` activity, if it has run at
    /// least once since the engine started; `None` before that.
    pub last_known_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunView {
    pub summary: Option<pbsflow_common::RunSummary>,
    pub activities: Vec<pbsflow_common::ActivityExecution>,
}

/// `GET /api/status`: `{pbs, run, next_run, build}`.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    let (summary, activities) = match state.run_manager.status().await {
        Ok(value) => value,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: err.to_string() }))
                .into_response()
        }
    };

    let last_known_status = activities
        .iter()
        .find(|execution| execution.type_name == "PowerOn")
        .and_then(|execution| execution.status.clone());

    let response = StatusResponse {
        pbs: PbsStatus { last_known_status },
        run: RunView { summary, activities },
        next_run: state.triggers.next_run(),
        build: state.build.clone(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub no_logs: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryRecord {
    pub summary: pbsflow_common::RunSummary,
    pub activity_executions: Vec<pbsflow_common::ActivityExecution>,
}

/// `GET /api/history` with optional `?no_logs=true`, which strips the `logs`
/// array from every activity execution to keep the response small.
pub async fn history_handler(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Response {
    let summaries = match state.run_manager.history().await {
        Ok(summaries) => summaries,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: err.to_string() }))
                .into_response()
        }
    };

    let mut records = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let mut executions = match state.run_manager.logs_for(&summary.id).await {
            Ok(executions) => executions,
            Err(err) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: err.to_string() }))
                    .into_response()
            }
        };
        if query.no_logs {
            for execution in &mut executions {
                execution.logs.clear();
            }
        }
        records.push(HistoryRecord {
            summary,
            activity_executions: executions,
        });
    }

    (StatusCode::OK, Json(records)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HistoryLogsQuery {
    pub id: String,
}

/// `GET /api/history/logs?id=…`: one run's full execution records.
pub async fn history_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryLogsQuery>,
) -> Response {
    match state.run_manager.logs_for(&query.id).await {
        Ok(executions) => (StatusCode::OK, Json(executions)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: err.to_string() })).into_response(),
    }
}

/// `POST /reload`: atomically swap the in-memory config from the file on
/// disk; any run already executing keeps the `Arc<EngineConfig>` snapshot
/// it started with.
pub async fn reload_handler(State(state): State<AppState>) -> Response {
    match crate::config::EngineConfig::load(&state.config_path) {
        Ok(fresh) => {
            state.config.store(std::sync::Arc::new(fresh));
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: err.to_string() })).into_response(),
    }
}

/// `GET /config`: current config as YAML, sensitive fields redacted.
pub async fn config_handler(State(state): State<AppState>) -> Response {
    let redacted = state.config.load_full().redacted();
    match serde_yaml::to_string(&redacted) {
        Ok(yaml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/yaml")],
            yaml,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: err.to_string() })).into_response(),
    }
}

/// `GET /metrics`: Prometheus text exposition format.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    (StatusCode::OK, state.metrics.render()).into_response()
}

/// `GET /healthz`: `text/plain` `ok`.
pub async fn healthz_handler() -> &'static str {
    "ok"
}
