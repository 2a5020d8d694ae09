//! Run comparison handler

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, error};

use super::parse_id;
use crate::compare::{self, CompareError};
use crate::server::types::ErrorResponse;
use crate::server::AppState;

/// `POST /scans/:base/compare/:other`: full comparison document
pub async fn compare_scans(
    State(state): State<AppState>,
    Path((base, other)): Path<(String, String)>,
) -> impl IntoResponse {
    let base_id = match parse_id(&base, "scan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let other_id = match parse_id(&other, "scan") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    debug!("compare scans {} -> {}", base_id, other_id);
    match compare::compare_scans(state.store.as_ref(), base_id, other_id).await {
        Ok(comparison) => (StatusCode::OK, Json(comparison)).into_response(),
        Err(CompareError::ScanNotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "SCAN_NOT_FOUND",
                format!("scan {} does not exist", id),
            )),
        )
            .into_response(),
        Err(CompareError::SiteMismatch) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "SITE_MISMATCH",
                "scans belong to different sites",
            )),
        )
            .into_response(),
        Err(CompareError::Store(e)) => {
            error!("comparison failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
                .into_response()
        }
    }
}
