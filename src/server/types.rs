//! JSON request/response types for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::JobType;

/// Body of `POST /jobs`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub site_id: Uuid,
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: JobType,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Free-form payload forwarded to the worker (discovery method,
    /// comparison scan IDs, caps)
    #[serde(default)]
    pub metadata: Option<std::collections::BTreeMap<String, serde_json::Value>>,
}

fn default_job_type() -> JobType {
    JobType::Scan
}

/// Response of `POST /jobs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub status: String,
}

/// Response of cancel/retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobActionResponse {
    pub success: bool,
    pub message: String,
}

/// Query parameters of `GET /jobs`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
    pub site_id: Option<Uuid>,
}

/// Response of `GET /jobs/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatsResponse {
    pub queued: u64,
    pub running: u64,
    pub failed: u64,
    /// Lifetime counters for this process
    pub started_total: u64,
    pub completed_total: u64,
    pub failed_total: u64,
    pub cancelled_total: u64,
}

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Error payload for every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}
