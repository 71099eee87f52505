use log::*;
use recon_engine::{AlarmService, ReconRepository, SqliteDatabase};

use crate::{config::DaemonConfig, errors::DaemonError, timing_worker::start_timing_worker};

/// Runs the daemon until Ctrl-C is received.
pub async fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let mut db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| DaemonError::InitializeError(format!("Could not connect to {}. {e}", config.database_url)))?;
    if config.recon.auto_init_tables {
        db.run_migrations().await?;
    } else {
        info!("🚀️ RECON_AUTO_INIT_TABLES is off. The reconciliation tables must already exist.");
    }
    let worker = if config.recon.enabled && config.recon.timing.enabled {
        let alarms = AlarmService::new(&config.recon.alarm);
        Some(start_timing_worker(db.clone(), config.recon.clone(), alarms))
    } else {
        info!("🚀️ Timing reconciliation is not enabled. Set RECON_ENABLED and RECON_TIMING_ENABLED to turn it on.");
        None
    };
    info!("🚀️ Reconciliation daemon running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutting down");
    if let Some(worker) = worker {
        worker.abort();
    }
    db.close().await?;
    Ok(())
}
