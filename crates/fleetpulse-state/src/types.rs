//! Domain types for the fleetpulse state store.
//!
//! These types represent registered devices and the health-check history
//! recorded against them. All types are serializable to/from JSON for
//! storage in redb tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a registered device.
pub type DeviceId = String;

// ── Device ─────────────────────────────────────────────────────────

/// Reachability of a device as of the last completed health-check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    /// Devices start offline until a cycle has seen them.
    #[default]
    Offline,
}

impl DeviceStatus {
    pub fn from_online(is_online: bool) -> Self {
        if is_online {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network-attached device whose `/health` endpoint is probed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Owning user in the registry. Not used by health checks.
    pub owner_id: u64,
    /// Unix timestamp (seconds) when the device was registered.
    pub created_at: u64,
}

impl Device {
    /// `ip:port` as used for the TCP connection.
    pub fn address(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            // Bare IPv6 literal.
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}

// ── Status checks ─────────────────────────────────────────────────

/// Outcome of checking one device in one cycle, before it is committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCheck {
    pub device_id: DeviceId,
    pub is_online: bool,
    /// Attempts that succeeded, in `0..=total_attempts`.
    pub success_count: u32,
    /// Attempt budget used for the cycle.
    pub total_attempts: u32,
    /// Mean latency over successful attempts; absent with zero successes.
    pub response_time: Option<Duration>,
    /// Last failure seen; only present when every attempt failed.
    pub error_message: Option<String>,
    /// Unix timestamp (seconds).
    pub checked_at: u64,
}

impl StatusCheck {
    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from_online(self.is_online)
    }
}

/// A committed, immutable history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusCheckRecord {
    /// Sequence number of the cycle that wrote this record.
    pub cycle: u64,
    #[serde(flatten)]
    pub check: StatusCheck,
}

impl StatusCheckRecord {
    /// `(device_id, cycle)`; device ids are compared whole, never by prefix.
    pub fn table_key(&self) -> (&str, u64) {
        (self.check.device_id.as_str(), self.cycle)
    }
}

/// A device whose status changed when a cycle was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub device_id: DeviceId,
    pub from: DeviceStatus,
    pub to: DeviceStatus,
}

/// Result of committing one cycle's write set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCommit {
    pub cycle: u64,
    pub records: usize,
    pub transitions: Vec<StatusTransition>,
}
