//! timbrel-serve - main entry point
//!
//! Serving phase of the timbrel pipeline: load the trained catalog and
//! cluster model (or fail fast), then answer recommendation queries over
//! HTTP until shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use timbrel_common::config::RootFolder;
use timbrel_common::db::{init_pool, CatalogStore};
use timbrel_serve::state::Snapshot;
use timbrel_serve::{build_router, AppState};
use tokio::signal;
use tracing::info;

/// Command-line arguments for timbrel-serve
#[derive(Parser, Debug)]
#[command(name = "timbrel-serve")]
#[command(about = "Timbre-similarity recommendation daemon")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5731", env = "TIMBREL_PORT")]
    port: u16,

    /// Data root containing the catalog database and model file
    #[arg(short, long, env = "TIMBREL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timbrel_serve=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting timbrel-serve v{}", env!("CARGO_PKG_VERSION"));

    let root = RootFolder::resolve(args.root_folder.as_deref());
    info!("Data root: {}", root.path().display());

    let pool = init_pool(&root.database_path())
        .await
        .context("failed to open catalog database")?;
    let store = CatalogStore::new(pool);

    // Load-or-fail: serving never starts on a partial catalog or model
    let model_path = root.model_path();
    let snapshot = Snapshot::load(&store, &model_path)
        .await
        .context("cannot serve without a trained catalog and model")?;
    info!(
        "Serving {} tracks across {} clusters",
        snapshot.recommender.catalog().len(),
        snapshot.recommender.model().k()
    );

    let state = AppState::new(snapshot, store, model_path);
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
