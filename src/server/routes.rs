//! HTTP API route definitions

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::AppState;

/// Build the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/jobs", post(handlers::create_job).get(handlers::list_jobs))
        .route("/jobs/stats", get(handlers::job_stats))
        .route("/jobs/:id/cancel", post(handlers::cancel_job))
        .route("/jobs/:id/retry", post(handlers::retry_job))
        .route("/scans/:base/compare/:other", post(handlers::compare_scans))
        .with_state(state)
}
