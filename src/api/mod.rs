//! HTTP surface for workers, admins and the public status page.
//!
//! Handlers are thin: they move the synchronous [`JobQueue`] call onto the
//! blocking pool and shape the result.

pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::scheduler::{JobLease, JobQueue, JobReport, JobsSnapshot};
use types::{
    ApiError, ApiResponse, ApiResult, FetchRequest, ForceRefreshRequest, MirrorItemDto,
    ReloadSummary,
};

/// Error code returned when a fetch finds nothing to hand out.
pub const NO_PENDING_JOB: &str = "NO_PENDING_JOB";

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/fetch", post(fetch_job_handler))
        .route("/jobs/forceRefresh", post(force_refresh_handler))
        .route("/jobs/{job_id}", put(report_job_handler))
        .route("/webhook/reload", post(reload_handler))
        .route("/mirrors", get(list_mirrors_handler))
        .route("/mirrors/lastActive", get(last_active_handler))
        .route("/mirrors/{id}", get(get_mirror_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!(addr = %addr, error = %e, "Failed to bind API server"))?;

    tracing::info!(addr = %addr, "Starting API server");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Run a queue call on the blocking pool. Status writes may hit SQLite.
async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))
}

async fn list_jobs_handler(State(state): State<AppState>) -> ApiResult<Json<JobsSnapshot>> {
    let queue = state.queue.clone();
    Ok(Json(blocking(move || queue.get_jobs()).await?))
}

async fn fetch_job_handler(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> ApiResult<Json<ApiResponse<JobLease>>> {
    let queue = state.queue.clone();
    let lease = blocking(move || queue.try_get_new_job(&req.worker_id)).await?;
    Ok(Json(match lease {
        Some(lease) => ApiResponse::ok(lease),
        None => ApiResponse::fail(NO_PENDING_JOB),
    }))
}

/// Reports are always acknowledged; the outcome only shows up in the logs.
async fn report_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(report): Json<JobReport>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let queue = state.queue.clone();
    let outcome = blocking(move || queue.report_job(job_id, report)).await?;
    tracing::debug!(job_id = %job_id, outcome = ?outcome, "Job report handled");
    Ok(Json(ApiResponse::accepted()))
}

async fn force_refresh_handler(
    State(state): State<AppState>,
    Json(req): Json<ForceRefreshRequest>,
) -> Json<ApiResponse<()>> {
    state.queue.force_refresh(&req.mirror_id);
    Json(ApiResponse::accepted())
}

async fn reload_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ReloadSummary>>> {
    let queue = state.queue.clone();
    let summary = blocking(move || {
        queue.reload()?;
        let status = queue.get_queue_status();
        Ok::<_, crate::error::OrchestratorError>(ReloadSummary {
            pending: status.pending,
            syncing: status.syncing,
            data: queue.state().get_all(),
        })
    })
    .await?
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(
        pending = summary.pending,
        syncing = summary.syncing,
        mirrors = summary.data.len(),
        "Configuration reloaded"
    );
    Ok(Json(ApiResponse::ok(summary)))
}

async fn list_mirrors_handler(State(state): State<AppState>) -> Json<Vec<MirrorItemDto>> {
    let mirrors = state.queue.state().get_all();
    Json(mirrors.iter().map(MirrorItemDto::from).collect())
}

async fn get_mirror_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MirrorItemDto>> {
    state
        .queue
        .state()
        .get_by_id(&id)
        .map(|item| Json(MirrorItemDto::from(&item)))
        .ok_or_else(|| ApiError::NotFound(format!("mirror {id}")))
}

/// Unix seconds of the last worker fetch or report.
async fn last_active_handler(State(state): State<AppState>) -> Json<i64> {
    Json(state.queue.last_active().timestamp())
}
