//! timbrel-train - catalog building and cluster model training
//!
//! Batch entry point for the training phase: scan a music directory,
//! fingerprint every recognized audio file, persist the catalog, fit the
//! k-means model, write cluster labels back in catalog order, and persist
//! the model. Runs to completion; labels and model are only written after a
//! successful fit, so a failed run leaves no half-trained state behind.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use timbrel_common::clustering::KMeansModel;
use timbrel_common::config::RootFolder;
use timbrel_common::db::{init_pool, CatalogStore};
use timbrel_dsp::{ingest, FeatureExtractor};
use tracing::{info, warn};

/// Command-line arguments for timbrel-train
#[derive(Parser, Debug)]
#[command(name = "timbrel-train")]
#[command(about = "Fingerprint a music collection and train the timbre cluster model")]
#[command(version)]
struct Args {
    /// Directory of audio files to fingerprint; omit to retrain on the
    /// already-persisted catalog
    #[arg(short, long)]
    music_dir: Option<PathBuf>,

    /// Number of timbre clusters
    #[arg(short = 'k', long, default_value_t = 10)]
    clusters: usize,

    /// Seed for k-means initialization
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Data root containing the catalog database and model file
    #[arg(short, long, env = "TIMBREL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timbrel_train=info,timbrel_dsp=info,timbrel_common=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting timbrel-train v{}", env!("CARGO_PKG_VERSION"));

    let root = RootFolder::resolve(args.root_folder.as_deref());
    root.ensure_exists()?;
    info!("Data root: {}", root.path().display());

    let pool = init_pool(&root.database_path())
        .await
        .context("failed to open catalog database")?;
    let store = CatalogStore::new(pool);

    let mut catalog = match &args.music_dir {
        Some(dir) => {
            info!("Fingerprinting audio files under {}", dir.display());
            let extractor = FeatureExtractor::default();
            let (catalog, report) =
                ingest::build_catalog(dir, &extractor).context("catalog build failed")?;
            for (path, reason) in &report.skipped {
                warn!("Skipped {}: {}", path.display(), reason);
            }
            info!(
                "Fingerprinted {} of {} files",
                report.cataloged, report.scanned
            );

            // Persist fingerprints before training so a failed fit still
            // leaves a reusable catalog behind.
            store
                .save(&catalog)
                .await
                .context("failed to persist catalog")?;
            catalog
        }
        None => {
            let loaded = store
                .load()
                .await
                .context("failed to load persisted catalog")?;
            info!("Loaded {} cataloged tracks for retraining", loaded.len());
            loaded.into_unlabeled()
        }
    };

    if catalog.is_empty() {
        bail!("catalog is empty; nothing to train on");
    }

    let fingerprints: Vec<_> = catalog.iter().map(|e| e.fingerprint).collect();
    info!(
        "Fitting k-means: k = {}, seed = {}, {} fingerprints",
        args.clusters,
        args.seed,
        fingerprints.len()
    );
    let model = KMeansModel::fit(&fingerprints, args.clusters, args.seed)
        .context("training preconditions not met")?;

    let labels = model.labels(&fingerprints);
    catalog.write_cluster_labels(&labels)?;
    store
        .save(&catalog)
        .await
        .context("failed to persist cluster labels")?;
    model
        .save(&root.model_path())
        .context("failed to persist model")?;

    info!("Model written to {}", root.model_path().display());
    info!(
        "Training complete: {} tracks across {} clusters",
        catalog.len(),
        args.clusters
    );
    Ok(())
}
