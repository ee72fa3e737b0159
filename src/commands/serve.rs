//! `rotor serve`: run the engine and its HTTP front until Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::coordinator::{AppState, Controller, RotationEngine, RotorServer};
use crate::detector::GeoDetector;
use crate::metrics;
use crate::storage::{ControlRepository, S3ObjectStore, SqliteRowStore};
use crate::watcher::ProbeOracle;

/// Start the engine, serve HTTP, and on shutdown stop every background task
pub async fn serve(config: Config) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let rows = SqliteRowStore::new(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.database.sqlite_path.display()
        )
    })?;
    let repo = ControlRepository::new(Arc::new(rows));

    let engine_config = config.engine_config()?;
    let detector = GeoDetector::from_config(&config.geo).context("Failed to load IP database")?;
    let engine = Arc::new(RotationEngine::new(engine_config.partners.clone(), detector));

    let oracle = ProbeOracle::new(config.probe.endpoints.clone(), config.probe_timeout())
        .context("Failed to create probe oracle")?;
    if oracle.endpoint_count() == 0 {
        tracing::warn!("no probe endpoints configured, every domain counts as healthy");
    }
    let store = S3ObjectStore::connect(config.object_store_config())
        .await
        .context("Failed to create object store client")?;

    let controller = Controller::start(
        engine_config,
        repo.clone(),
        engine.clone(),
        Arc::new(oracle),
        Arc::new(store),
    )
    .await
    .context("Failed to start rotation engine")?;

    let bind_address = config.server.bind_address;
    let server = RotorServer::new(config.server, AppState::new(repo, engine));

    println!("rotor {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Endpoints:");
    println!("  GET  /                        - Service banner");
    println!("  GET  /health                  - Liveness with group counts");
    println!("  GET  /metrics                 - Prometheus metrics");
    println!("  POST /domain/get_url          - Rotated domain (groupID, type)");
    println!("  POST /domain/get_data         - Rotated content (groupID, domainGroupID)");
    println!("  POST /domain/...              - Group and domain administration");
    println!();
    println!("Listening on http://{bind_address}");
    println!("Press Ctrl+C to stop.\n");

    let served = server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await;

    controller.shutdown().await;
    served?;

    println!("rotor stopped.");
    Ok(())
}
