//! Recommendation endpoints
//!
//! `POST /recommend` fingerprints an uploaded recording and samples
//! co-members of its predicted cluster. `GET /recommend/track/{track_id}`
//! does the same for an already-cataloged track using its stored
//! fingerprint, excluding the track itself.

use crate::engine::{RecommendOutcome, DEFAULT_COUNT, DEFAULT_SEED};
use crate::{ApiError, ApiResult, AppState};
use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    /// Maximum number of recommendations to return
    #[serde(default = "default_count")]
    pub count: usize,
    /// Sampling seed; identical queries with identical seeds return
    /// identical lists
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_count() -> usize {
    DEFAULT_COUNT
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    /// Cluster the query was classified into
    pub cluster: u32,
    /// Sampled track ids, in draw order
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn outcome_response(outcome: RecommendOutcome) -> RecommendResponse {
    match outcome {
        RecommendOutcome::Recommendations { cluster, tracks } => RecommendResponse {
            cluster,
            recommendations: tracks,
            message: None,
        },
        RecommendOutcome::NoRecommendations { cluster } => RecommendResponse {
            cluster,
            recommendations: Vec::new(),
            message: Some("no other tracks in this cluster".to_string()),
        },
    }
}

/// POST /recommend - classify an uploaded recording and sample co-members
pub async fn recommend_upload(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
    mut multipart: Multipart,
) -> ApiResult<Json<RecommendResponse>> {
    if params.count == 0 {
        return Err(ApiError::BadRequest("count must be at least 1".to_string()));
    }

    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
            upload = Some((file_name, bytes.to_vec()));
            break;
        }
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("missing multipart field 'file'".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }
    debug!(
        "recommend query: {} bytes uploaded as {:?}",
        bytes.len(),
        file_name
    );

    // Decoding and MFCC analysis are CPU-bound; keep them off the runtime
    let extractor = state.extractor.clone();
    let extension = file_name.as_deref().and_then(|name| {
        std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string)
    });
    let fingerprint = tokio::task::spawn_blocking(move || {
        extractor.extract_bytes(bytes, extension.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("extraction task failed: {e}")))?
    .map_err(|e| ApiError::BadRequest(format!("could not analyze upload: {e}")))?;

    let snapshot = state.snapshot().await;
    let outcome = snapshot
        .recommender
        .recommend(&fingerprint, None, params.count, params.seed);
    Ok(Json(outcome_response(outcome)))
}

/// GET /recommend/track/{track_id} - recommend from a cataloged fingerprint
pub async fn recommend_for_track(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
    Query(params): Query<RecommendParams>,
) -> ApiResult<Json<RecommendResponse>> {
    if params.count == 0 {
        return Err(ApiError::BadRequest("count must be at least 1".to_string()));
    }

    let snapshot = state.snapshot().await;
    let entry = snapshot
        .recommender
        .catalog()
        .get(&track_id)
        .ok_or_else(|| ApiError::NotFound(format!("track not cataloged: {track_id}")))?;
    let fingerprint = entry.fingerprint;

    let outcome = snapshot.recommender.recommend(
        &fingerprint,
        Some(&track_id),
        params.count,
        params.seed,
    );
    Ok(Json(outcome_response(outcome)))
}

/// Build recommendation routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recommend", post(recommend_upload))
        .route("/recommend/track/:track_id", get(recommend_for_track))
}
