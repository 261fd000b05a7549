//! Health scheduler — named recurring jobs on fixed intervals.
//!
//! Each job id owns at most one timer task. Arming an id that is already
//! armed stops the old timer and starts a new one in its place. Runs of
//! the same job never overlap: a tick that fires while the previous run
//! is still going is skipped.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Work invoked on every tick. Must handle its own errors.
pub type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Per-job timer state.
struct JobSlot {
    /// Handle to the timer task.
    handle: JoinHandle<()>,
    /// Shutdown signal for the timer task.
    shutdown_tx: watch::Sender<bool>,
    /// Held for the duration of a run. Shared across re-arms.
    in_flight: Arc<Mutex<()>>,
    /// Ticks dropped because a run was still in flight.
    skipped: Arc<AtomicU64>,
    interval: Duration,
}

impl JobSlot {
    fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
    }
}

/// Owns every armed job. Built once at startup and passed where needed.
#[derive(Clone, Default)]
pub struct HealthScheduler {
    /// Armed jobs: job_id → slot.
    jobs: Arc<RwLock<HashMap<String, JobSlot>>>,
}

impl HealthScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `job` to run every `interval`, first run one interval from now.
    ///
    /// Re-arming an existing `job_id` replaces its timer; there is never
    /// more than one live timer per id.
    pub async fn arm(&self, job_id: &str, interval: Duration, job: Job) -> SchedulerResult<()> {
        if job_id.trim().is_empty() {
            return Err(SchedulerError::EmptyJobId);
        }
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval {
                job_id: job_id.to_string(),
                interval,
            });
        }

        let mut jobs = self.jobs.write().await;

        let (in_flight, skipped) = match jobs.remove(job_id) {
            Some(old) => {
                let shared = (old.in_flight.clone(), old.skipped.clone());
                old.stop();
                debug!(%job_id, "replacing armed job");
                shared
            }
            None => (Arc::new(Mutex::new(())), Arc::new(AtomicU64::new(0))),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_job_loop(
            job_id.to_string(),
            interval,
            job,
            in_flight.clone(),
            skipped.clone(),
            shutdown_rx,
        ));

        jobs.insert(
            job_id.to_string(),
            JobSlot {
                handle,
                shutdown_tx,
                in_flight,
                skipped,
                interval,
            },
        );

        info!(%job_id, interval_ms = interval.as_millis() as u64, "job armed");
        Ok(())
    }

    /// Stop a job's timer. A run already in flight finishes on its own.
    pub async fn disarm(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.remove(job_id) {
            Some(slot) => {
                slot.stop();
                info!(%job_id, "job disarmed");
                true
            }
            None => false,
        }
    }

    /// Stop every timer (for graceful shutdown).
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.write().await;
        for (id, slot) in jobs.drain() {
            slot.stop();
            debug!(job_id = %id, "job disarmed");
        }
        info!("health scheduler stopped");
    }

    /// List armed job ids.
    pub async fn armed_jobs(&self) -> Vec<String> {
        let jobs = self.jobs.read().await;
        jobs.keys().cloned().collect()
    }

    pub async fn is_armed(&self, job_id: &str) -> bool {
        let jobs = self.jobs.read().await;
        jobs.contains_key(job_id)
    }

    /// Interval a job is armed with.
    pub async fn interval(&self, job_id: &str) -> Option<Duration> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|slot| slot.interval)
    }

    /// Number of ticks skipped so far because a run was still in flight.
    pub async fn skipped_ticks(&self, job_id: &str) -> Option<u64> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|slot| slot.skipped.load(Ordering::Relaxed))
    }
}

/// The timer loop for a single job.
async fn run_job_loop(
    job_id: String,
    interval: Duration,
    job: Job,
    in_flight: Arc<Mutex<()>>,
    skipped: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(%job_id, "job timer starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match in_flight.clone().try_lock_owned() {
                    Ok(guard) => {
                        let job = job.clone();
                        tokio::spawn(async move {
                            job().await;
                            drop(guard);
                        });
                    }
                    Err(_) => {
                        let total = skipped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(%job_id, skipped = total, "previous run still in flight, tick skipped");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!(%job_id, "job timer shutting down");
                break;
            }
        }
    }
}
