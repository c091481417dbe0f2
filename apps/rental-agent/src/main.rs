//! # Rental Agent
//!
//! Background process draining the vehicle-sync outbox.
//!
//! ## Usage
//! ```bash
//! # Default config location, run until Ctrl+C
//! cargo run -p rental-agent
//!
//! # Explicit config file, process one batch and exit
//! cargo run -p rental-agent -- --config ./rental.toml --once
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rental_db::Database;
use rental_engine::{EngineConfig, VehicleSyncDispatcher, VehicleSyncWorker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut once = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--once" => once = true,
            "--help" | "-h" => {
                println!("Rental Vehicle Sync Agent");
                println!();
                println!("Usage: rental-agent [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir/rental.toml)");
                println!("      --once           Process one batch and exit");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = EngineConfig::load(config_path)?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        database = %config.database.path.display(),
        poll_interval_secs = config.vehicle_sync.poll_interval_secs,
        "Starting rental agent"
    );

    let db = Database::new(config.database.db_config()).await?;
    let pending = db.vehicle_sync_outbox().count_pending().await?;
    info!(pending, "Database ready");

    let db = Arc::new(db);
    let dispatcher =
        VehicleSyncDispatcher::new(db.clone(), db.clone(), config.vehicle_sync.clone());
    let (worker, handle) =
        VehicleSyncWorker::new(dispatcher, db.clone(), config.vehicle_sync.clone());

    if once {
        let report = worker.process_pending().await?;
        info!(
            applied = report.applied.len(),
            failed = report.failures.len(),
            "Single batch processed"
        );
        db.close().await;
        return Ok(());
    }

    let task = tokio::spawn(worker.run());

    shutdown_signal().await;

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Worker already stopped");
    }
    task.await?;

    db.close().await;
    info!("Rental agent stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping worker");
}
