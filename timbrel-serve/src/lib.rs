//! timbrel-serve - recommendation daemon
//!
//! Loads the trained catalog + model snapshot at startup and answers
//! timbre-similarity queries over HTTP. Queries run against immutable
//! snapshots; reload swaps the whole snapshot atomically so concurrent
//! readers never observe a half-updated catalog.

pub mod api;
pub mod engine;
pub mod error;
pub mod state;

pub use crate::error::{ApiError, ApiResult};

use crate::state::Snapshot;
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use timbrel_common::db::CatalogStore;
use timbrel_dsp::FeatureExtractor;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
///
/// The snapshot is behind `Arc<RwLock<Arc<..>>>`: handlers clone the inner
/// Arc once and use it for the whole request, reload replaces it wholesale.
#[derive(Clone)]
pub struct AppState {
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    pub store: CatalogStore,
    pub model_path: PathBuf,
    pub extractor: Arc<FeatureExtractor>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(snapshot: Snapshot, store: CatalogStore, model_path: PathBuf) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
            store,
            model_path,
            extractor: Arc::new(FeatureExtractor::default()),
            startup_time: Utc::now(),
        }
    }

    /// Current immutable snapshot
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    /// Atomically replace the serving snapshot
    pub async fn install_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = Arc::new(snapshot);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health::routes())
        .merge(api::recommend::routes())
        .merge(api::catalog::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
