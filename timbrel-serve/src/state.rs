//! Serving snapshot
//!
//! The catalog and model are loaded together, validated as a consistent
//! pair, and then never mutated. Handlers work against one immutable
//! snapshot for the lifetime of a request; reload builds a fresh snapshot
//! and swaps it in wholesale.

use crate::engine::Recommender;
use chrono::{DateTime, Utc};
use std::path::Path;
use thiserror::Error;
use timbrel_common::clustering::{KMeansModel, ModelError};
use timbrel_common::db::CatalogStore;
use tracing::info;

/// Why a catalog/model pair cannot serve
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("catalog is empty; run timbrel-train first")]
    EmptyCatalog,

    #[error("catalog has no cluster labels; run timbrel-train first")]
    UnlabeledCatalog,

    #[error("catalog labels reference cluster {label} but the model has k = {k}")]
    LabelOutOfRange { label: u32, k: usize },

    #[error("failed to load model: {0}")]
    Model(#[from] ModelError),

    #[error("failed to load catalog: {0}")]
    Catalog(#[from] timbrel_common::Error),
}

/// One immutable catalog + model pair
pub struct Snapshot {
    pub recommender: Recommender,
    pub loaded_at: DateTime<Utc>,
}

impl Snapshot {
    /// Load the catalog and model from disk and validate they form a
    /// servable pair. Any failure here is fatal to startup; serving never
    /// runs against a partial or unlabeled catalog.
    pub async fn load(store: &CatalogStore, model_path: &Path) -> Result<Self, SnapshotError> {
        let catalog = store.load().await?;
        if catalog.is_empty() {
            return Err(SnapshotError::EmptyCatalog);
        }
        if !catalog.is_labeled() {
            return Err(SnapshotError::UnlabeledCatalog);
        }

        let model = KMeansModel::load(model_path)?;
        for entry in catalog.iter() {
            if let Some(label) = entry.cluster {
                if label as usize >= model.k() {
                    return Err(SnapshotError::LabelOutOfRange {
                        label,
                        k: model.k(),
                    });
                }
            }
        }

        info!(
            "Snapshot loaded: {} tracks, k = {}",
            catalog.len(),
            model.k()
        );
        Ok(Self {
            recommender: Recommender::new(catalog, model),
            loaded_at: Utc::now(),
        })
    }
}
