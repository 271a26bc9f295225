use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::StoreConfig;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    /// Interval of the in-process dispatch worker, if enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_interval_seconds: Option<u64>,
    pub timestamp: String,
}

/// Liveness only; does not touch the store or the gateway.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = match state.config.store {
        StoreConfig::Sqlite(_) => "sqlite",
        StoreConfig::Rest(_) => "rest",
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store,
        dispatch_interval_seconds: state.config.dispatch.interval_seconds,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
