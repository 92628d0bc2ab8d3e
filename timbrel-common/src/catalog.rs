//! In-memory track catalog
//!
//! Ordered rows of (track id, fingerprint, optional cluster label). Label
//! state is all-or-nothing: a catalog is either fully unlabeled
//! (pre-training) or fully labeled (post-training); mixed state is rejected
//! so the serving path can never observe a half-trained catalog.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Catalog consistency errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Track id already present
    #[error("duplicate track id: {0}")]
    DuplicateTrack(String),

    /// Label vector length differs from catalog row count
    #[error("label count {labels} does not match catalog rows {rows}")]
    LabelCountMismatch { labels: usize, rows: usize },

    /// Labels were already written for this training cycle
    #[error("catalog already has cluster labels")]
    AlreadyLabeled,

    /// Some rows labeled, some not
    #[error("catalog mixes labeled and unlabeled rows")]
    MixedLabels,
}

/// One cataloged recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Path relative to the scanned music root; unique within the catalog
    pub track_id: String,
    pub fingerprint: Fingerprint,
    /// Assigned once per training cycle; `None` before training
    pub cluster: Option<u32>,
    pub analyzed_at: DateTime<Utc>,
}

/// Ordered collection of cataloged recordings with unique track ids
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from rows, validating id uniqueness and label state
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let labeled = entries.iter().filter(|e| e.cluster.is_some()).count();
        if labeled != 0 && labeled != entries.len() {
            return Err(CatalogError::MixedLabels);
        }

        let mut catalog = Self::new();
        for entry in entries {
            catalog.push(entry)?;
        }
        Ok(catalog)
    }

    /// Append a row; fails on a duplicate track id
    pub fn push(&mut self, entry: CatalogEntry) -> Result<(), CatalogError> {
        if self.index.contains_key(&entry.track_id) {
            return Err(CatalogError::DuplicateTrack(entry.track_id));
        }
        self.index.insert(entry.track_id.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn get(&self, track_id: &str) -> Option<&CatalogEntry> {
        self.index.get(track_id).map(|&i| &self.entries[i])
    }

    /// All rows carrying the given cluster label; empty is a valid result
    pub fn entries_in_cluster(&self, label: u32) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(move |e| e.cluster == Some(label))
    }

    /// True once every row carries a cluster label
    pub fn is_labeled(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.cluster.is_some())
    }

    /// Assign one label per row, in catalog order.
    ///
    /// Called exactly once per training cycle; relabeling requires resetting
    /// with [`Catalog::into_unlabeled`] first.
    pub fn write_cluster_labels(&mut self, labels: &[u32]) -> Result<(), CatalogError> {
        if self.entries.iter().any(|e| e.cluster.is_some()) {
            return Err(CatalogError::AlreadyLabeled);
        }
        if labels.len() != self.entries.len() {
            return Err(CatalogError::LabelCountMismatch {
                labels: labels.len(),
                rows: self.entries.len(),
            });
        }
        for (entry, &label) in self.entries.iter_mut().zip(labels) {
            entry.cluster = Some(label);
        }
        Ok(())
    }

    /// Drop all cluster labels, e.g. before retraining on a loaded catalog
    pub fn into_unlabeled(mut self) -> Self {
        for entry in &mut self.entries {
            entry.cluster = None;
        }
        self
    }
}
