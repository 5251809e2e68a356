//! The HTTP facade: a stateless, authenticated wrapper over the engine.
//!
//! Mutating routes require `Authorization: Bearer <apiKey>`; the status and
//! configuration routes are read-only and open. Every error response uses
//! the `{"status": N, "message": "..."}` body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use dragnet_core::wire::{ApiErrorBody, JobConfigData, JobData, StatusData};
use dragnet_server_engine::SearchEngine;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The search engine, shared with the sweeper.
    pub engine: Arc<SearchEngine>,
    /// Bearer token expected on mutating routes.
    pub api_key: String,
    /// Timing settings served to workers.
    pub job_config: JobConfigData,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "invalid or missing API key".to_string(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            status: self.status.as_u16(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the facade router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/job", get(issue_job))
        .route(
            "/job/:id",
            axum::routing::put(update_job)
                .post(finish_job)
                .delete(cancel_job),
        )
        .route("/results", axum::routing::post(accept_results))
        .route("/status", get(status))
        .route("/status/jobs/:kind", get(status_jobs))
        .route("/status/results", get(status_results))
        .route("/configuration/job", get(job_configuration))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = format!("Bearer {}", state.api_key);
    match headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) if value == expected => Ok(()),
        _ => {
            tracing::warn!("rejected request with invalid or missing API key");
            Err(ApiError::unauthorized())
        }
    }
}

fn parse_job_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse::<u64>()
        .map_err(|_| ApiError::bad_request(format!("invalid job id '{raw}'")))
}

/// Rewrite the checkpoint after a state change. Write failures are logged
/// and never fail the request: in-memory state stays canonical until the
/// next successful write.
async fn persist_after_change(state: &AppState) {
    if let Err(err) = state.engine.persist().await {
        tracing::error!("checkpoint write failed: {err:#}");
    }
}

async fn issue_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<JobData>, ApiError> {
    check_auth(&state, &headers)?;

    let batch_size = match params.get("batchSize") {
        None => 1,
        Some(raw) => match raw.parse::<u64>() {
            Ok(size) if size >= 1 => size,
            _ => {
                return Err(ApiError::bad_request(format!(
                    "batchSize must be a positive integer, got '{raw}'"
                )));
            }
        },
    };

    Ok(Json(state.engine.issue_job(batch_size)))
}

async fn update_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<bool>, ApiError> {
    check_auth(&state, &headers)?;
    let id = parse_job_id(&id)?;
    if state.engine.update_job(id) {
        Ok(Json(true))
    } else {
        Err(ApiError::bad_request(format!("job '{id}' is not running")))
    }
}

async fn finish_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<bool>, ApiError> {
    check_auth(&state, &headers)?;
    let id = parse_job_id(&id)?;
    if state.engine.finish_job(id) {
        persist_after_change(&state).await;
        Ok(Json(true))
    } else {
        Err(ApiError::bad_request(format!("job '{id}' is not running")))
    }
}

async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<bool>, ApiError> {
    check_auth(&state, &headers)?;
    let id = parse_job_id(&id)?;
    if state.engine.cancel_job(id) {
        persist_after_change(&state).await;
        Ok(Json(true))
    } else {
        Err(ApiError::bad_request(format!("job '{id}' is not running")))
    }
}

async fn accept_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<bool>, ApiError> {
    check_auth(&state, &headers)?;

    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("request body must be JSON"))?;
    let serde_json::Value::Array(results) = value else {
        return Err(ApiError::bad_request("request body must be a JSON array"));
    };

    state.engine.accept_results(results);
    persist_after_change(&state).await;
    Ok(Json(true))
}

async fn status(State(state): State<AppState>) -> Json<StatusData> {
    Json(state.engine.status())
}

async fn status_jobs(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<JobData>>, ApiError> {
    let jobs = match kind.as_str() {
        "running" => state.engine.running_jobs(),
        "pending" => state.engine.pending_jobs(),
        "failed" => state.engine.failed_jobs(),
        "completed" => state.engine.completed_jobs(),
        other => {
            return Err(ApiError::not_found(format!("unknown job list '{other}'")));
        }
    };
    Ok(Json(jobs))
}

async fn status_results(State(state): State<AppState>) -> Json<Vec<serde_json::Value>> {
    Json(state.engine.results())
}

async fn job_configuration(State(state): State<AppState>) -> Json<JobConfigData> {
    Json(state.job_config)
}
