//! fleetpulse-health — periodic reachability checks for registered devices.
//!
//! Probes every device's `/health` endpoint a fixed number of times per
//! cycle, folds the attempts into an online/offline verdict, and commits
//! the verdicts plus a history record per device to the state store as
//! one transaction.
//!
//! # Architecture
//!
//! ```text
//! HealthScheduler
//!   └── one timer per job id (re-arming replaces the old timer)
//!       └── CycleRunner::run_cycle()
//!           ├── DeviceRegistry::list_devices()     snapshot
//!           ├── DeviceChecker::check() per device  bounded parallelism
//!           │   └── Probe::probe() × max_attempts  never short-circuited
//!           └── DeviceRegistry::commit_cycle()     all-or-nothing
//! ```
//!
//! # Overlap
//!
//! A tick that arrives while the previous run of the same job is still in
//! flight is skipped and counted, never queued.

pub mod checker;
pub mod cycle;
pub mod error;
pub mod probe;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use checker::{CheckerConfig, DeviceChecker, Verdict};
pub use cycle::{CycleReport, CycleRunner, DeviceRegistry};
pub use error::{CycleError, SchedulerError};
pub use probe::{FailureKind, HttpProbe, Probe, ProbeOutcome};
pub use scheduler::{HealthScheduler, Job};
