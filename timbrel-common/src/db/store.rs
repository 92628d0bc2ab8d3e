//! Catalog table access
//!
//! The store replaces the whole table inside one transaction on save, so
//! readers either see the previous catalog or the new one, never a partially
//! labeled mix.

use crate::catalog::{Catalog, CatalogEntry};
use crate::fingerprint::{Fingerprint, FINGERPRINT_DIM};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

const MFCC_COLUMNS: [&str; FINGERPRINT_DIM] = [
    "mfcc_01", "mfcc_02", "mfcc_03", "mfcc_04", "mfcc_05", "mfcc_06", "mfcc_07", "mfcc_08",
    "mfcc_09", "mfcc_10", "mfcc_11", "mfcc_12", "mfcc_13",
];

const INSERT_TRACK: &str = r#"
    INSERT INTO tracks (
        position, track_id,
        mfcc_01, mfcc_02, mfcc_03, mfcc_04, mfcc_05, mfcc_06, mfcc_07,
        mfcc_08, mfcc_09, mfcc_10, mfcc_11, mfcc_12, mfcc_13,
        cluster, analyzed_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_TRACKS: &str = r#"
    SELECT track_id,
           mfcc_01, mfcc_02, mfcc_03, mfcc_04, mfcc_05, mfcc_06, mfcc_07,
           mfcc_08, mfcc_09, mfcc_10, mfcc_11, mfcc_12, mfcc_13,
           cluster, analyzed_at
    FROM tracks
    ORDER BY position
"#;

/// Durable round-trip of the catalog row table
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the persisted catalog with `catalog`, all or nothing
    pub async fn save(&self, catalog: &Catalog) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tracks").execute(&mut *tx).await?;

        for (position, entry) in catalog.iter().enumerate() {
            let mut query = sqlx::query(INSERT_TRACK)
                .bind(position as i64)
                .bind(&entry.track_id);
            for &coefficient in entry.fingerprint.as_slice() {
                query = query.bind(coefficient as f64);
            }
            query = query
                .bind(entry.cluster.map(|c| c as i64))
                .bind(entry.analyzed_at);
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Persisted catalog: {} rows", catalog.len());
        Ok(())
    }

    /// Load the persisted catalog in its original row order
    pub async fn load(&self) -> Result<Catalog> {
        let rows = sqlx::query(SELECT_TRACKS).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let track_id: String = row.try_get("track_id")?;

            let mut coefficients = [0.0f32; FINGERPRINT_DIM];
            for (value, column) in coefficients.iter_mut().zip(MFCC_COLUMNS) {
                *value = row.try_get::<f64, _>(column)? as f32;
            }
            let fingerprint = Fingerprint::new(&coefficients).map_err(|e| {
                Error::InvalidInput(format!("corrupt fingerprint for {}: {}", track_id, e))
            })?;

            let cluster: Option<i64> = row.try_get("cluster")?;
            let cluster = match cluster {
                Some(label) if label >= 0 => Some(label as u32),
                Some(label) => {
                    return Err(Error::InvalidInput(format!(
                        "negative cluster label {} for {}",
                        label, track_id
                    )))
                }
                None => None,
            };
            let analyzed_at: DateTime<Utc> = row.try_get("analyzed_at")?;

            entries.push(CatalogEntry {
                track_id,
                fingerprint,
                cluster,
                analyzed_at,
            });
        }

        debug!("Loaded catalog: {} rows", entries.len());
        Catalog::from_entries(entries).map_err(|e| Error::InvalidInput(e.to_string()))
    }
}
