//! Per-device attempt loop and verdict rule.
//!
//! A device is probed exactly `max_attempts` times per cycle. The
//! outcomes are folded into a [`Verdict`]; a device is online when at
//! least half of the attempts succeeded (2 of 4 is online).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use fleetpulse_state::StatusCheck;

use crate::probe::{FailureKind, Probe, ProbeOutcome};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Cap for a single attempt.
    pub timeout: Duration,
    /// Attempts per device per cycle. Values below 1 are treated as 1.
    pub max_attempts: u32,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Aggregated result of one device's attempts in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_online: bool,
    pub success_count: u32,
    pub total_attempts: u32,
    /// Mean latency of successful attempts only.
    pub response_time: Option<Duration>,
    /// Last failure, reported only if no attempt succeeded.
    pub error_message: Option<String>,
}

impl Verdict {
    pub fn into_status_check(self, device_id: impl Into<String>, checked_at: u64) -> StatusCheck {
        StatusCheck {
            device_id: device_id.into(),
            is_online: self.is_online,
            success_count: self.success_count,
            total_attempts: self.total_attempts,
            response_time: self.response_time,
            error_message: self.error_message,
            checked_at,
        }
    }
}

/// Minimum successes for an online verdict: half the budget, rounded up.
pub fn online_threshold(max_attempts: u32) -> u32 {
    max_attempts.max(1).div_ceil(2)
}

#[derive(Debug, Default)]
struct Tally {
    success_count: u32,
    total_latency: Duration,
    last_error: Option<FailureKind>,
}

impl Tally {
    fn record(mut self, outcome: ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Success(latency) => {
                self.success_count += 1;
                self.total_latency += latency;
            }
            ProbeOutcome::Failure(kind) => self.last_error = Some(kind),
        }
        self
    }

    fn into_verdict(self, max_attempts: u32) -> Verdict {
        let succeeded = self.success_count > 0;
        Verdict {
            is_online: self.success_count >= online_threshold(max_attempts),
            success_count: self.success_count,
            total_attempts: max_attempts,
            response_time: succeeded.then(|| self.total_latency / self.success_count),
            error_message: if succeeded {
                None
            } else {
                self.last_error.map(|kind| kind.to_string())
            },
        }
    }
}

/// Fold a device's attempt outcomes into a verdict.
pub fn aggregate(outcomes: impl IntoIterator<Item = ProbeOutcome>, max_attempts: u32) -> Verdict {
    outcomes
        .into_iter()
        .fold(Tally::default(), Tally::record)
        .into_verdict(max_attempts)
}

/// Runs the attempt budget against one device. Holds no per-device state.
pub struct DeviceChecker<P> {
    probe: Arc<P>,
    config: CheckerConfig,
}

impl<P> Clone for DeviceChecker<P> {
    fn clone(&self) -> Self {
        Self {
            probe: self.probe.clone(),
            config: self.config,
        }
    }
}

impl<P: Probe> DeviceChecker<P> {
    pub fn new(probe: Arc<P>, config: CheckerConfig) -> Self {
        let config = CheckerConfig {
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        Self { probe, config }
    }

    pub fn config(&self) -> CheckerConfig {
        self.config
    }

    /// Probe `address` sequentially `max_attempts` times and aggregate.
    ///
    /// Failures never stop the loop early; the full budget is always spent.
    pub async fn check(&self, address: &str) -> Verdict {
        let mut outcomes = Vec::with_capacity(self.config.max_attempts as usize);
        for attempt in 1..=self.config.max_attempts {
            let outcome = self.probe.probe(address, self.config.timeout).await;
            if let ProbeOutcome::Failure(kind) = &outcome {
                debug!(%address, attempt, error = %kind, "attempt failed");
            }
            outcomes.push(outcome);
        }
        aggregate(outcomes, self.config.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedProbe, fail, ok};

    #[test]
    fn threshold_is_half_rounded_up() {
        assert_eq!(online_threshold(4), 2);
        assert_eq!(online_threshold(3), 2);
        assert_eq!(online_threshold(2), 1);
        assert_eq!(online_threshold(1), 1);
        assert_eq!(online_threshold(0), 1);
    }

    #[test]
    fn all_success_is_online_without_error() {
        let verdict = aggregate([ok(10), ok(20), ok(30), ok(40)], 4);
        assert!(verdict.is_online);
        assert_eq!(verdict.success_count, 4);
        assert_eq!(verdict.total_attempts, 4);
        assert_eq!(verdict.response_time, Some(Duration::from_millis(25)));
        assert_eq!(verdict.error_message, None);
    }

    #[test]
    fn two_of_four_is_online() {
        let verdict = aggregate(
            [
                fail(FailureKind::Timeout),
                ok(10),
                fail(FailureKind::BadStatus(500)),
                ok(30),
            ],
            4,
        );
        assert!(verdict.is_online);
        assert_eq!(verdict.success_count, 2);
        // Mean over the two successes only.
        assert_eq!(verdict.response_time, Some(Duration::from_millis(20)));
        // Partial success carries no error text.
        assert_eq!(verdict.error_message, None);
    }

    #[test]
    fn one_of_four_is_offline() {
        let verdict = aggregate(
            [
                ok(10),
                fail(FailureKind::Timeout),
                fail(FailureKind::Timeout),
                fail(FailureKind::Timeout),
            ],
            4,
        );
        assert!(!verdict.is_online);
        assert_eq!(verdict.success_count, 1);
        assert_eq!(verdict.response_time, Some(Duration::from_millis(10)));
        assert_eq!(verdict.error_message, None);
    }

    #[test]
    fn zero_successes_reports_last_error() {
        let verdict = aggregate(
            [
                fail(FailureKind::Timeout),
                fail(FailureKind::BadStatus(502)),
                fail(FailureKind::Timeout),
                fail(FailureKind::ConnectionRefused),
            ],
            4,
        );
        assert!(!verdict.is_online);
        assert_eq!(verdict.success_count, 0);
        assert_eq!(verdict.response_time, None);
        assert_eq!(verdict.error_message.as_deref(), Some("ConnectionRefused"));
    }

    #[test]
    fn odd_budget_needs_majority() {
        assert!(!aggregate([ok(1), fail(FailureKind::Timeout), fail(FailureKind::Timeout)], 3).is_online);
        assert!(aggregate([ok(1), ok(1), fail(FailureKind::Timeout)], 3).is_online);
        assert!(!aggregate([fail(FailureKind::Timeout)], 1).is_online);
        assert!(aggregate([ok(1)], 1).is_online);
    }

    #[test]
    fn verdict_converts_to_status_check() {
        let check = aggregate([ok(8), ok(8), ok(8), ok(8)], 4).into_status_check("rpi-1", 1234);
        assert_eq!(check.device_id, "rpi-1");
        assert!(check.is_online);
        assert_eq!(check.success_count, 4);
        assert_eq!(check.total_attempts, 4);
        assert_eq!(check.checked_at, 1234);
    }

    #[tokio::test]
    async fn checker_spends_full_budget_after_failures() {
        let probe = Arc::new(ScriptedProbe::default().with(
            "10.0.0.1:80",
            vec![
                fail(FailureKind::ConnectionRefused),
                fail(FailureKind::ConnectionRefused),
                ok(5),
                ok(7),
            ],
        ));
        let checker = DeviceChecker::new(probe.clone(), CheckerConfig::default());

        let verdict = checker.check("10.0.0.1:80").await;
        assert_eq!(probe.calls("10.0.0.1:80"), 4);
        assert!(verdict.is_online);
        assert_eq!(verdict.response_time, Some(Duration::from_millis(6)));
    }

    #[tokio::test]
    async fn checker_spends_full_budget_after_successes() {
        let probe = Arc::new(ScriptedProbe::default().with(
            "10.0.0.2:80",
            vec![ok(1), ok(1), ok(1), ok(1), ok(1), ok(1)],
        ));
        let config = CheckerConfig {
            timeout: Duration::from_millis(100),
            max_attempts: 6,
        };
        let verdict = DeviceChecker::new(probe.clone(), config)
            .check("10.0.0.2:80")
            .await;
        assert_eq!(probe.calls("10.0.0.2:80"), 6);
        assert_eq!(verdict.success_count, 6);
        assert_eq!(verdict.total_attempts, 6);
    }

    #[tokio::test]
    async fn zero_attempt_budget_is_raised_to_one() {
        let probe = Arc::new(ScriptedProbe::default().with("h:1", vec![ok(3)]));
        let config = CheckerConfig {
            timeout: Duration::from_millis(100),
            max_attempts: 0,
        };
        let checker = DeviceChecker::new(probe.clone(), config);
        assert_eq!(checker.config().max_attempts, 1);

        let verdict = checker.check("h:1").await;
        assert_eq!(probe.calls("h:1"), 1);
        assert!(verdict.is_online);
    }
}
