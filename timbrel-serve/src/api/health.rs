//! Health check endpoint

use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Module name ("timbrel-serve")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Cataloged tracks in the current snapshot
    pub tracks: usize,
    /// Cluster count of the current model
    pub clusters: usize,
    /// When the current snapshot was loaded
    pub snapshot_loaded_at: DateTime<Utc>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let snapshot = state.snapshot().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "timbrel-serve".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        tracks: snapshot.recommender.catalog().len(),
        clusters: snapshot.recommender.model().k(),
        snapshot_loaded_at: snapshot.loaded_at,
    })
}

/// Build health check routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
