//! Shared registry file.
//!
//! redb locks its file for as long as a `Database` is open, so no handle
//! is kept between operations. The daemon opens the file to snapshot the
//! registry and again to commit a cycle; probing happens with the file
//! closed. Operator commands (`device`, `status`, `check-once`) and other
//! registry writers open the same file in the gaps, waiting briefly when
//! it is held.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use fleetpulse_core::config::DEFAULT_LOCK_WAIT;
use fleetpulse_health::DeviceRegistry;
use fleetpulse_state::{CycleCommit, Device, StateError, StateResult, StateStore, StatusCheck};

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct SharedStore {
    path: PathBuf,
    lock_wait: Duration,
}

impl SharedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file, retrying while another handle holds it.
    ///
    /// The returned store holds the lock until it is dropped; keep it only
    /// for the duration of one operation.
    pub async fn open(&self) -> StateResult<StateStore> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            match StateStore::open(&self.path) {
                Err(StateError::Locked(_)) if Instant::now() < deadline => {
                    debug!(path = %self.path.display(), "store locked, waiting");
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    /// Open, run `f`, and release the file.
    pub async fn with_store<T>(
        &self,
        f: impl FnOnce(&StateStore) -> StateResult<T>,
    ) -> StateResult<T> {
        let store = self.open().await?;
        f(&store)
    }
}

impl DeviceRegistry for SharedStore {
    async fn list_devices(&self) -> StateResult<Vec<Device>> {
        self.with_store(StateStore::list_devices).await
    }

    async fn commit_cycle(&self, checks: &[StatusCheck]) -> StateResult<CycleCommit> {
        self.with_store(|store| store.commit_cycle(checks)).await
    }
}
