//! Effective daemon settings: config file first, CLI flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use fleetpulse_core::{FleetConfig, ResolvedHealth, StoreSection, format_duration};

use crate::Overrides;

pub const DEFAULT_LOG_FILTER: &str = "info,fleetpulsed=debug,fleetpulse=debug";
pub const STORE_FILE_NAME: &str = "fleetpulse.redb";

#[derive(Debug, Clone)]
pub struct Settings {
    pub store_path: PathBuf,
    /// How long store access waits on another process holding the file.
    pub lock_wait: Duration,
    pub health: ResolvedHealth,
}

impl Settings {
    /// Load `config` (if given), apply `overrides`, and validate the result.
    pub fn load(config: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let file = match config {
            Some(path) => FleetConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => FleetConfig::default(),
        };
        Self::resolve(&file, overrides)
    }

    pub fn resolve(file: &FleetConfig, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut health = file.resolve_health()?;
        if let Some(interval) = overrides.interval {
            health.interval = interval;
        }
        if let Some(timeout) = overrides.timeout {
            health.timeout = timeout;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            health.max_attempts = max_attempts;
        }
        health.validate()?;

        let store_path = match &overrides.data_dir {
            Some(dir) => dir.join(STORE_FILE_NAME),
            None => file.store_path(),
        };

        let lock_wait = file.store_lock_wait()?;

        debug!(
            store = %store_path.display(),
            lock_wait_ms = lock_wait.as_millis() as u64,
            job_id = %health.job_id,
            interval_ms = health.interval.as_millis() as u64,
            timeout_ms = health.timeout.as_millis() as u64,
            max_attempts = health.max_attempts,
            max_concurrency = health.max_concurrency,
            "settings resolved"
        );
        Ok(Self {
            store_path,
            lock_wait,
            health,
        })
    }
}

/// Default config with every field spelled out, flags applied on top.
pub fn scaffold(overrides: &Overrides) -> FleetConfig {
    let mut config = FleetConfig::scaffold();
    if let Some(dir) = &overrides.data_dir {
        let store = config.store.get_or_insert_with(StoreSection::default);
        store.path = Some(dir.join(STORE_FILE_NAME));
    }
    if let Some(health) = config.health.as_mut() {
        if let Some(interval) = overrides.interval {
            health.interval = Some(format_duration(interval));
        }
        if let Some(timeout) = overrides.timeout {
            health.timeout = Some(format_duration(timeout));
        }
        if let Some(max_attempts) = overrides.max_attempts {
            health.max_attempts = Some(max_attempts);
        }
    }
    config
}

/// Write the scaffold to `path`. Refuses to overwrite unless `force`.
pub fn write_scaffold(path: &Path, overrides: &Overrides, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let config = scaffold(overrides);
    // A scaffold that fails validation is never written.
    Settings::resolve(&config, &Overrides::default())?;
    std::fs::write(path, config.to_toml_string()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("✓ Generated {}", path.display());
    Ok(())
}
