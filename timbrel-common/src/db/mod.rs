//! SQLite persistence for the track catalog

pub mod store;

pub use store::CatalogStore;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the catalog database and ensure its schema exists
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to catalog database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the catalog table if it does not exist.
///
/// Fingerprints are stored as 13 REAL columns; f32 -> REAL (f64) -> f32 is
/// exact, so persisted coefficients reload bit-identically.
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            position INTEGER PRIMARY KEY,
            track_id TEXT NOT NULL UNIQUE,
            mfcc_01 REAL NOT NULL,
            mfcc_02 REAL NOT NULL,
            mfcc_03 REAL NOT NULL,
            mfcc_04 REAL NOT NULL,
            mfcc_05 REAL NOT NULL,
            mfcc_06 REAL NOT NULL,
            mfcc_07 REAL NOT NULL,
            mfcc_08 REAL NOT NULL,
            mfcc_09 REAL NOT NULL,
            mfcc_10 REAL NOT NULL,
            mfcc_11 REAL NOT NULL,
            mfcc_12 REAL NOT NULL,
            mfcc_13 REAL NOT NULL,
            cluster INTEGER,
            analyzed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
