//! Public HTTP API surface.
//!
//! Thin axum handlers over the store and the comparison engine; the
//! dashboard and auth layers live outside this crate and consume these
//! endpoints.

mod handlers;
mod routes;
mod server;
pub mod types;

pub use routes::create_router;
pub use server::HttpServer;

use std::sync::Arc;

use crate::metrics::MonitorMetrics;
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub metrics: Arc<MonitorMetrics>,
}
