//! HTTP request handlers

mod compare;
mod jobs;
mod system;

pub use compare::compare_scans;
pub use jobs::{cancel_job, create_job, job_stats, list_jobs, retry_job};
pub use system::health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::types::ErrorResponse;

/// Cap on `GET /jobs` responses
pub(super) const JOB_LIST_CAP: usize = 100;

/// Parse a UUID path segment, mapping failure to 400
pub(super) fn parse_id(raw: &str, what: &str) -> Result<uuid::Uuid, Response> {
    uuid::Uuid::parse_str(raw).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "INVALID_ID",
                format!("'{}' is not a valid {} ID", raw, what),
            )),
        )
            .into_response()
    })
}
