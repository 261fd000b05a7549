//! Run mode — arm the health job and serve until Ctrl-C.
//!
//! In this mode, the daemon:
//! 1. Creates the state store file if needed
//! 2. Builds the probe, checker and cycle runner
//! 3. Arms the health job on the configured interval
//! 4. On Ctrl-C, disarms every job and exits
//!
//! The store file is only held open while a cycle reads its snapshot and
//! while it commits, never across probing or idle time.

use std::sync::Arc;

use tracing::info;

use fleetpulse_health::HealthScheduler;

use crate::inspect;
use crate::settings::Settings;

pub async fn run_daemon(settings: Settings) -> anyhow::Result<()> {
    info!("fleetpulse daemon starting");

    let shared = inspect::shared_store(&settings).await?;
    let runner = Arc::new(inspect::build_runner(shared, &settings));

    let scheduler = HealthScheduler::new();
    scheduler
        .arm(
            &settings.health.job_id,
            settings.health.interval,
            runner.into_job(),
        )
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    scheduler.shutdown().await;
    info!("fleetpulse daemon stopped");
    Ok(())
}
