//! Health check endpoint
//!
//! `/health` and `/healthz` are liveness checks: 200 whenever the process is
//! serving, with build and storage details for deployment checks.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub healthy: bool,
    /// Service version
    pub version: &'static str,
    /// Short git commit captured at build time
    pub commit: &'static str,
    pub built_at: &'static str,
    /// Seconds since the server state was created
    pub uptime: u64,
    /// `memory` or `mongodb`
    pub storage: &'static str,
    pub timestamp: String,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
        uptime: state.started_at.elapsed().as_secs(),
        storage: state.args.storage_backend(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Handle liveness check (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}
