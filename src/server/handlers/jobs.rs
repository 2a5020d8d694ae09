//! Job handlers: trigger, cancel, retry, stats, list

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, error};

use super::{parse_id, JOB_LIST_CAP};
use crate::server::types::*;
use crate::server::AppState;
use crate::store::JobFilter;
use crate::types::{Job, JobStatus};

/// `POST /jobs`: enqueue a job for a site
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> impl IntoResponse {
    match state.store.get_site(request.site_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("SITE_NOT_FOUND", "site does not exist")),
            )
                .into_response();
        }
        Err(e) => {
            error!("site lookup failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
                .into_response();
        }
    }

    let mut job = Job::new(request.site_id, request.job_type);
    if let Some(priority) = request.priority {
        job.priority = priority;
    }
    if let Some(when) = request.scheduled_for {
        job.scheduled_for = Some(when);
    }
    if let Some(metadata) = request.metadata {
        job.metadata = metadata;
    }

    debug!("enqueue {:?} job {} for site {}", job.job_type, job.id, job.site_id);
    match state.store.create_job(job).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(JobCreatedResponse {
                job_id: job_id.to_string(),
                status: "queued".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("job creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
                .into_response()
        }
    }
}

/// `POST /jobs/:id/cancel`: queued/running -> cancelled
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job_id = match parse_id(&job_id, "job") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.cancel_job(job_id).await {
        Ok(true) => {
            state.metrics.jobs_cancelled.inc();
            (
                StatusCode::OK,
                Json(JobActionResponse {
                    success: true,
                    message: "job cancelled".to_string(),
                }),
            )
                .into_response()
        }
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(JobActionResponse {
                success: false,
                message: "job is already terminal".to_string(),
            }),
        )
            .into_response(),
        Err(crate::store::StoreError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("JOB_NOT_FOUND", "job does not exist")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal_error(e.to_string())),
        )
            .into_response(),
    }
}

/// `POST /jobs/:id/retry`: failed -> queued, if retries remain
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job_id = match parse_id(&job_id, "job") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.retry_job(job_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(JobActionResponse {
                success: true,
                message: "job re-queued".to_string(),
            }),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::CONFLICT,
            Json(JobActionResponse {
                success: false,
                message: "only failed jobs with remaining retries can be retried".to_string(),
            }),
        )
            .into_response(),
        Err(crate::store::StoreError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("JOB_NOT_FOUND", "job does not exist")),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal_error(e.to_string())),
        )
            .into_response(),
    }
}

/// `GET /jobs/stats`: queue depth plus lifetime counters
pub async fn job_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.job_stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(JobStatsResponse {
                queued: stats.queued,
                running: stats.running,
                failed: stats.failed,
                started_total: state.metrics.jobs_started.get(),
                completed_total: state.metrics.jobs_completed.get(),
                failed_total: state.metrics.jobs_failed.get(),
                cancelled_total: state.metrics.jobs_cancelled.get(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal_error(e.to_string())),
        )
            .into_response(),
    }
}

/// `GET /jobs?status=&site_id=`: filtered listing, capped
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref() {
        None => None,
        Some("queued") => Some(JobStatus::Queued),
        Some("running") => Some(JobStatus::Running),
        Some("completed") => Some(JobStatus::Completed),
        Some("failed") => Some(JobStatus::Failed),
        Some("cancelled") => Some(JobStatus::Cancelled),
        Some(other) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "INVALID_STATUS",
                    format!("'{}' is not a job status", other),
                )),
            )
                .into_response();
        }
    };

    let filter = JobFilter {
        status,
        site_id: query.site_id,
        limit: JOB_LIST_CAP,
    };

    match state.store.list_jobs(filter).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal_error(e.to_string())),
        )
            .into_response(),
    }
}
