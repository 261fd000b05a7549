//! fleetpulse.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::duration::{format_duration, parse_duration};

pub const DEFAULT_JOB_ID: &str = "device_health_check";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;
pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_STORE_PATH: &str = "/var/lib/fleetpulse/fleetpulse.redb";
/// How long a command waits for another process to release the store file.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render toml: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    pub store: Option<StoreSection>,
    pub health: Option<HealthSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
    pub lock_wait: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSection {
    pub job_id: Option<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub max_attempts: Option<u32>,
    pub max_concurrency: Option<usize>,
    pub path: Option<String>,
}

/// Health settings with defaults applied and durations parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHealth {
    pub job_id: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub max_concurrency: usize,
    pub path: String,
}

impl Default for ResolvedHealth {
    fn default() -> Self {
        Self {
            job_id: DEFAULT_JOB_ID.to_string(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

impl ResolvedHealth {
    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "health.job_id",
                reason: "must not be empty",
            });
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "health.interval",
                reason: "must be greater than zero",
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "health.timeout",
                reason: "must be greater than zero",
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "health.max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "health.max_concurrency",
                reason: "must be at least 1",
            });
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "health.path",
                reason: "must start with '/'",
            });
        }
        Ok(())
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the redb file, falling back to the default location.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    /// `[store] lock_wait`, falling back to the default.
    pub fn store_lock_wait(&self) -> Result<Duration, ConfigError> {
        let raw = self.store.as_ref().and_then(|s| s.lock_wait.clone());
        resolve_duration("store.lock_wait", &raw, DEFAULT_LOCK_WAIT)
    }

    /// Apply defaults to the `[health]` section, parse durations, and validate.
    pub fn resolve_health(&self) -> Result<ResolvedHealth, ConfigError> {
        let defaults = ResolvedHealth::default();
        let Some(section) = &self.health else {
            return Ok(defaults);
        };

        let resolved = ResolvedHealth {
            job_id: section.job_id.clone().unwrap_or(defaults.job_id),
            interval: resolve_duration("health.interval", &section.interval, defaults.interval)?,
            timeout: resolve_duration("health.timeout", &section.timeout, defaults.timeout)?,
            max_attempts: section.max_attempts.unwrap_or(defaults.max_attempts),
            max_concurrency: section.max_concurrency.unwrap_or(defaults.max_concurrency),
            path: section.path.clone().unwrap_or(defaults.path),
        };
        resolved.validate()?;
        Ok(resolved)
    }

    /// Scaffold a fully populated config with every default spelled out.
    pub fn scaffold() -> Self {
        let health = ResolvedHealth::default();
        FleetConfig {
            store: Some(StoreSection {
                path: Some(PathBuf::from(DEFAULT_STORE_PATH)),
                lock_wait: Some(format_duration(DEFAULT_LOCK_WAIT)),
            }),
            health: Some(HealthSection {
                job_id: Some(health.job_id),
                interval: Some(format_duration(health.interval)),
                timeout: Some(format_duration(health.timeout)),
                max_attempts: Some(health.max_attempts),
                max_concurrency: Some(health.max_concurrency),
                path: Some(health.path),
            }),
        }
    }
}

fn resolve_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::Duration {
            field,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_round_trips() {
        let config = FleetConfig::scaffold();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("device_health_check"));
        assert!(toml_str.contains("1m"));

        let parsed = FleetConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.resolve_health().unwrap(), ResolvedHealth::default());
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = FleetConfig::from_toml_str("").unwrap();
        let health = config.resolve_health().unwrap();
        assert_eq!(health.interval, Duration::from_secs(60));
        assert_eq!(health.timeout, Duration::from_secs(5));
        assert_eq!(health.max_attempts, 4);
        assert_eq!(health.path, "/health");
        assert_eq!(config.store_path(), PathBuf::from(DEFAULT_STORE_PATH));
    }

    #[test]
    fn test_parse_partial_health_section() {
        let toml_str = r#"
[store]
path = "/tmp/fp.redb"

[health]
interval = "5s"
max_attempts = 3
"#;
        let config = FleetConfig::from_toml_str(toml_str).unwrap();
        let health = config.resolve_health().unwrap();
        assert_eq!(health.interval, Duration::from_secs(5));
        assert_eq!(health.max_attempts, 3);
        assert_eq!(health.timeout, DEFAULT_TIMEOUT);
        assert_eq!(health.job_id, DEFAULT_JOB_ID);
        assert_eq!(config.store_path(), PathBuf::from("/tmp/fp.redb"));
    }

    #[test]
    fn test_bad_duration_is_reported_with_field() {
        let config = FleetConfig::from_toml_str("[health]\ntimeout = \"fast\"\n").unwrap();
        let err = config.resolve_health().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Duration { field: "health.timeout", .. }
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = FleetConfig::from_toml_str("[health]\ninterval = \"0s\"\n").unwrap();
        assert!(matches!(
            config.resolve_health(),
            Err(ConfigError::Invalid { field: "health.interval", .. })
        ));

        let config = FleetConfig::from_toml_str("[health]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(
            config.resolve_health(),
            Err(ConfigError::Invalid { field: "health.max_attempts", .. })
        ));
    }

    #[test]
    fn test_path_must_be_absolute() {
        let config = FleetConfig::from_toml_str("[health]\npath = \"health\"\n").unwrap();
        assert!(matches!(
            config.resolve_health(),
            Err(ConfigError::Invalid { field: "health.path", .. })
        ));
    }

    #[test]
    fn test_store_lock_wait() {
        let config = FleetConfig::from_toml_str("").unwrap();
        assert_eq!(config.store_lock_wait().unwrap(), DEFAULT_LOCK_WAIT);

        let config = FleetConfig::from_toml_str("[store]\nlock_wait = \"250ms\"\n").unwrap();
        assert_eq!(config.store_lock_wait().unwrap(), Duration::from_millis(250));

        let config = FleetConfig::from_toml_str("[store]\nlock_wait = \"later\"\n").unwrap();
        assert!(matches!(
            config.store_lock_wait(),
            Err(ConfigError::Duration { field: "store.lock_wait", .. })
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            FleetConfig::from_toml_str("[health\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetpulse.toml");
        std::fs::write(&path, "[health]\njob_id = \"probe\"\n").unwrap();

        let config = FleetConfig::from_file(&path).unwrap();
        assert_eq!(config.resolve_health().unwrap().job_id, "probe");

        let missing = FleetConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
