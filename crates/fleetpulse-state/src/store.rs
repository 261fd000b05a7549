//! StateStore — redb-backed state persistence for fleetpulse.
//!
//! Provides typed operations over the device registry and the status-check
//! history. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// redb locks the file for as long as the store is alive; a second
    /// open fails with [`StateError::Locked`] until every clone is dropped.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            redb::DatabaseError::DatabaseAlreadyOpen => {
                StateError::Locked(path.display().to_string())
            }
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(DEVICES).map_err(map_err!(Table))?;
        txn.open_table(STATUS_CHECKS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Devices ────────────────────────────────────────────────────

    /// Insert or update a device record.
    pub fn put_device(&self, device: &Device) -> StateResult<()> {
        let value = serde_json::to_vec(device).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            table
                .insert(device.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(device_id = %device.id, "device stored");
        Ok(())
    }

    /// Get a device by ID.
    pub fn get_device(&self, device_id: &str) -> StateResult<Option<Device>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        match table.get(device_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let device: Device =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(device))
            }
            None => Ok(None),
        }
    }

    /// List all devices, ordered by ID.
    ///
    /// Reads from a single read transaction, so the result is a consistent
    /// snapshot even while other writers are active.
    pub fn list_devices(&self) -> StateResult<Vec<Device>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let device: Device =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(device);
        }
        Ok(results)
    }

    /// Delete a device by ID. Returns true if it existed.
    ///
    /// History for the device is kept.
    pub fn delete_device(&self, device_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            existed = table.remove(device_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%device_id, existed, "device deleted");
        Ok(existed)
    }

    /// Overwrite the status of a single device.
    pub fn set_device_status(&self, device_id: &str, status: DeviceStatus) -> StateResult<()> {
        self.write_atomically(|txn| {
            write_device_status(txn, device_id, status)?;
            Ok(())
        })
    }

    // ── Status checks ──────────────────────────────────────────────

    /// Append one history record outside of a cycle commit.
    ///
    /// The record gets its own cycle number. The device status is not
    /// touched.
    pub fn append_status_check(&self, check: &StatusCheck) -> StateResult<StatusCheckRecord> {
        self.write_atomically(|txn| {
            let cycle = next_cycle(txn)?;
            let record = StatusCheckRecord {
                cycle,
                check: check.clone(),
            };
            write_record(txn, &record)?;
            Ok(record)
        })
    }

    /// Commit one health-check cycle.
    ///
    /// For every check, sets the device's status from the verdict and
    /// appends a history record, all in one write transaction. If any
    /// device is missing or any write fails, nothing is committed.
    pub fn commit_cycle(&self, checks: &[StatusCheck]) -> StateResult<CycleCommit> {
        let commit = self.write_atomically(|txn| {
            let cycle = next_cycle(txn)?;
            let mut transitions = Vec::new();
            for check in checks {
                let to = check.status();
                let from = write_device_status(txn, &check.device_id, to)?;
                if from != to {
                    transitions.push(StatusTransition {
                        device_id: check.device_id.clone(),
                        from,
                        to,
                    });
                }
                write_record(
                    txn,
                    &StatusCheckRecord {
                        cycle,
                        check: check.clone(),
                    },
                )?;
            }
            Ok(CycleCommit {
                cycle,
                records: checks.len(),
                transitions,
            })
        })?;
        debug!(
            cycle = commit.cycle,
            records = commit.records,
            transitions = commit.transitions.len(),
            "cycle committed"
        );
        Ok(commit)
    }

    /// Most recent history records for a device, newest first.
    pub fn list_status_checks(
        &self,
        device_id: &str,
        limit: usize,
    ) -> StateResult<Vec<StatusCheckRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS_CHECKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range((device_id, 0u64)..=(device_id, u64::MAX))
            .map_err(map_err!(Read))?
            .rev()
        {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: StatusCheckRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// The newest history record for a device, if any.
    pub fn latest_status_check(&self, device_id: &str) -> StateResult<Option<StatusCheckRecord>> {
        Ok(self.list_status_checks(device_id, 1)?.pop())
    }

    /// Number of the last committed cycle (0 before the first one).
    pub fn last_cycle(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(META).map_err(map_err!(Table))?;
        let last = table
            .get(LAST_CYCLE_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);
        Ok(last)
    }

    /// Run `f` in a write transaction, committing on success and aborting
    /// on error.
    fn write_atomically<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> StateResult<T>,
    ) -> StateResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(e)
            }
        }
    }
}

/// Bump and return the cycle counter.
fn next_cycle(txn: &WriteTransaction) -> StateResult<u64> {
    let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
    let last = meta
        .get(LAST_CYCLE_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = last + 1;
    meta.insert(LAST_CYCLE_KEY, next).map_err(map_err!(Write))?;
    Ok(next)
}

/// Set a device's status, returning the status it had before.
fn write_device_status(
    txn: &WriteTransaction,
    device_id: &str,
    status: DeviceStatus,
) -> StateResult<DeviceStatus> {
    let mut table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
    let mut device: Device = match table.get(device_id).map_err(map_err!(Read))? {
        Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
        None => return Err(StateError::DeviceNotFound(device_id.to_string())),
    };
    let previous = device.status;
    device.status = status;
    let value = serde_json::to_vec(&device).map_err(map_err!(Serialize))?;
    table
        .insert(device_id, value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(previous)
}

fn write_record(txn: &WriteTransaction, record: &StatusCheckRecord) -> StateResult<()> {
    let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
    let mut table = txn.open_table(STATUS_CHECKS).map_err(map_err!(Table))?;
    table
        .insert(record.table_key(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}
