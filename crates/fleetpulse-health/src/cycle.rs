//! Check cycle — one pass over every registered device.
//!
//! The runner snapshots the registry, checks devices in parallel (bounded
//! by `max_concurrency`), then hands every verdict to the registry in a
//! single commit. A failure anywhere before the commit completes leaves
//! the store exactly as it was.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use fleetpulse_state::{
    CycleCommit, Device, DeviceStatus, StateResult, StateStore, StatusCheck,
};

use crate::checker::DeviceChecker;
use crate::error::CycleError;
use crate::probe::Probe;
use crate::scheduler::{Job, JobFuture};

pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Where a cycle reads its devices from and commits its results to.
///
/// Both calls may wait, e.g. for a database file held by another process.
pub trait DeviceRegistry: Send + Sync + 'static {
    /// Snapshot of every registered device.
    fn list_devices(&self) -> impl Future<Output = StateResult<Vec<Device>>> + Send;

    /// Write all status updates and history records of one cycle atomically.
    fn commit_cycle(
        &self,
        checks: &[StatusCheck],
    ) -> impl Future<Output = StateResult<CycleCommit>> + Send;
}

impl DeviceRegistry for StateStore {
    async fn list_devices(&self) -> StateResult<Vec<Device>> {
        StateStore::list_devices(self)
    }

    async fn commit_cycle(&self, checks: &[StatusCheck]) -> StateResult<CycleCommit> {
        StateStore::commit_cycle(self, checks)
    }
}

/// Summary of a committed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub devices: usize,
    pub online: usize,
    pub offline: usize,
    /// Devices that went offline → online in this cycle.
    pub came_online: usize,
    /// Devices that went online → offline in this cycle.
    pub went_offline: usize,
    pub elapsed: Duration,
    /// The committed checks, in registry order.
    pub checks: Vec<StatusCheck>,
}

impl CycleReport {
    fn new(commit: &CycleCommit, checks: Vec<StatusCheck>, elapsed: Duration) -> Self {
        let online = checks.iter().filter(|c| c.is_online).count();
        let came_online = commit
            .transitions
            .iter()
            .filter(|t| t.to == DeviceStatus::Online)
            .count();
        Self {
            cycle: commit.cycle,
            devices: checks.len(),
            online,
            offline: checks.len() - online,
            came_online,
            went_offline: commit.transitions.len() - came_online,
            elapsed,
            checks,
        }
    }
}

/// Runs check cycles against a registry with a fixed checker.
pub struct CycleRunner<R, P> {
    registry: R,
    checker: DeviceChecker<P>,
    max_concurrency: usize,
}

impl<R: DeviceRegistry, P: Probe> CycleRunner<R, P> {
    pub fn new(registry: R, checker: DeviceChecker<P>) -> Self {
        Self {
            registry,
            checker,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit how many devices are checked at the same time.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run one full cycle and commit it.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let devices = self
            .registry
            .list_devices()
            .await
            .map_err(CycleError::Registry)?;
        debug!(devices = devices.len(), "health check cycle starting");

        let checks = self.check_all(&devices).await?;
        let commit = self
            .registry
            .commit_cycle(&checks)
            .await
            .map_err(CycleError::Commit)?;

        for transition in &commit.transitions {
            match transition.to {
                DeviceStatus::Online => {
                    info!(device_id = %transition.device_id, "device came online")
                }
                DeviceStatus::Offline => {
                    warn!(device_id = %transition.device_id, "device went offline")
                }
            }
        }

        let report = CycleReport::new(&commit, checks, started.elapsed());
        info!(
            cycle = report.cycle,
            devices = report.devices,
            online = report.online,
            offline = report.offline,
            came_online = report.came_online,
            went_offline = report.went_offline,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "health check cycle completed"
        );
        Ok(report)
    }

    /// Check every device; results come back in the order of `devices`.
    async fn check_all(&self, devices: &[Device]) -> Result<Vec<StatusCheck>, CycleError> {
        let limiter = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, device) in devices.iter().enumerate() {
            let checker = self.checker.clone();
            let limiter = limiter.clone();
            let device_id = device.id.clone();
            let address = device.address();
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await;
                let verdict = checker.check(&address).await;
                (index, verdict.into_status_check(device_id, epoch_secs()))
            });
        }

        let mut checks: Vec<Option<StatusCheck>> = vec![None; devices.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, check) = joined.map_err(|e| CycleError::Task(e.to_string()))?;
            debug!(
                device_id = %check.device_id,
                status = %check.status(),
                success_count = check.success_count,
                total_attempts = check.total_attempts,
                response_time_ms = check.response_time.map(|d| d.as_millis() as u64),
                error = check.error_message.as_deref(),
                "device checked"
            );
            checks[index] = Some(check);
        }
        Ok(checks.into_iter().flatten().collect())
    }

    /// Wrap the runner as a scheduler job.
    ///
    /// Cycle failures are logged and swallowed so the next tick runs
    /// normally.
    pub fn into_job(self: Arc<Self>) -> Job {
        Arc::new(move || -> JobFuture {
            let runner = self.clone();
            Box::pin(async move {
                if let Err(e) = runner.run_cycle().await {
                    error!(error = %e, "health check cycle failed, device statuses unchanged");
                }
            })
        })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
