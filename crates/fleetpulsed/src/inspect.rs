//! Operator commands: store/runner wiring, `status` and `check-once`.
//!
//! Every command goes through [`SharedStore`], so each one works while a
//! `run` daemon is checking the same file.

use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use fleetpulse_health::{CheckerConfig, CycleReport, CycleRunner, DeviceChecker, HttpProbe};
use fleetpulse_state::{Device, StatusCheckRecord};

use crate::registry::SharedStore;
use crate::settings::Settings;

/// Shared handle on the configured store file. Creates the file and its
/// tables if missing.
pub async fn shared_store(settings: &Settings) -> anyhow::Result<SharedStore> {
    if let Some(parent) = settings.store_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let shared = SharedStore::new(&settings.store_path).with_lock_wait(settings.lock_wait);
    drop(shared.open().await?);
    info!(path = %shared.path().display(), "state store ready");
    Ok(shared)
}

pub fn build_runner(
    registry: SharedStore,
    settings: &Settings,
) -> CycleRunner<SharedStore, HttpProbe> {
    let health = &settings.health;
    let probe = HttpProbe::new(health.path.clone());
    debug!(
        path = probe.path(),
        timeout_ms = health.timeout.as_millis() as u64,
        max_attempts = health.max_attempts,
        "health probe configured"
    );
    let checker = DeviceChecker::new(
        Arc::new(probe),
        CheckerConfig {
            timeout: health.timeout,
            max_attempts: health.max_attempts,
        },
    );
    CycleRunner::new(registry, checker).with_max_concurrency(health.max_concurrency)
}

/// Devices plus their newest `limit` records, read in one open.
pub async fn load_status(
    shared: &SharedStore,
    limit: usize,
) -> anyhow::Result<Vec<(Device, Vec<StatusCheckRecord>)>> {
    let rows: Vec<(Device, Vec<StatusCheckRecord>)> = shared
        .with_store(|store| {
            store
                .list_devices()?
                .into_iter()
                .map(|device| {
                    let records = store.list_status_checks(&device.id, limit)?;
                    Ok((device, records))
                })
                .collect()
        })
        .await?;
    Ok(rows)
}

pub async fn print_status(settings: &Settings, limit: usize, json: bool) -> anyhow::Result<()> {
    let shared = shared_store(settings).await?;
    let rows = load_status(&shared, limit).await?;
    if rows.is_empty() && !json {
        println!("no devices registered");
        return Ok(());
    }

    for (device, records) in rows {
        if json {
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            continue;
        }
        println!(
            "{}  {}  {}  {}",
            device.id,
            device.name,
            device.address(),
            device.status
        );
        for record in &records {
            println!("    {}", render_record(record));
        }
    }
    Ok(())
}

pub async fn check_once(settings: &Settings) -> anyhow::Result<()> {
    let shared = shared_store(settings).await?;
    let report = build_runner(shared, settings).run_cycle().await?;
    println!("{}", render_report(&report));
    for check in &report.checks {
        println!(
            "    {}  {}  {}/{}",
            check.device_id,
            check.status(),
            check.success_count,
            check.total_attempts
        );
    }
    Ok(())
}

pub fn render_record(record: &StatusCheckRecord) -> String {
    let check = &record.check;
    let latency = check
        .response_time
        .map(|d| format!("{}ms", d.as_millis()))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "cycle {}  {}  {}/{}  {}",
        record.cycle,
        check.status(),
        check.success_count,
        check.total_attempts,
        latency
    );
    if let Some(error) = &check.error_message {
        line.push_str("  ");
        line.push_str(error);
    }
    line
}

pub fn render_report(report: &CycleReport) -> String {
    format!(
        "cycle {}: {} devices, {} online, {} offline (+{} online, -{} offline) in {}ms",
        report.cycle,
        report.devices,
        report.online,
        report.offline,
        report.came_online,
        report.went_offline,
        report.elapsed.as_millis()
    )
}
