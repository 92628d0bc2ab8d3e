//! Catalog listing and snapshot reload

use crate::state::Snapshot;
use crate::{ApiError, ApiResult, AppState};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct TrackRow {
    pub track_id: String,
    pub cluster: Option<u32>,
}

/// GET /tracks - catalog listing in catalog order
pub async fn list_tracks(State(state): State<AppState>) -> Json<Vec<TrackRow>> {
    let snapshot = state.snapshot().await;
    let rows = snapshot
        .recommender
        .catalog()
        .iter()
        .map(|e| TrackRow {
            track_id: e.track_id.clone(),
            cluster: e.cluster,
        })
        .collect();
    Json(rows)
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub tracks: usize,
    pub snapshot_loaded_at: DateTime<Utc>,
}

/// POST /reload - atomically swap in a freshly loaded snapshot.
///
/// On any load failure the previous snapshot keeps serving.
pub async fn reload(State(state): State<AppState>) -> ApiResult<Json<ReloadResponse>> {
    let snapshot = Snapshot::load(&state.store, &state.model_path)
        .await
        .map_err(|e| ApiError::Internal(format!("reload failed: {e}")))?;

    let tracks = snapshot.recommender.catalog().len();
    let loaded_at = snapshot.loaded_at;
    state.install_snapshot(snapshot).await;
    info!("Snapshot reloaded: {} tracks", tracks);

    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        tracks,
        snapshot_loaded_at: loaded_at,
    }))
}

/// Build catalog routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tracks", get(list_tracks))
        .route("/reload", post(reload))
}
