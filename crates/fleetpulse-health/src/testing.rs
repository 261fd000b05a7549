//! Scripted probe for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::probe::{FailureKind, Probe, ProbeOutcome};

/// Replays a fixed sequence of outcomes per address and counts calls.
#[derive(Default)]
pub(crate) struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<ProbeOutcome>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProbe {
    pub(crate) fn with(mut self, address: &str, outcomes: Vec<ProbeOutcome>) -> Self {
        self.scripts
            .get_mut()
            .unwrap()
            .insert(address.to_string(), outcomes.into());
        self
    }

    pub(crate) fn calls(&self, address: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

impl Probe for ScriptedProbe {
    async fn probe(&self, address: &str, _timeout: Duration) -> ProbeOutcome {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default() += 1;
        self.scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ProbeOutcome::Failure(FailureKind::Other("script exhausted".into())))
    }
}

pub(crate) fn ok(ms: u64) -> ProbeOutcome {
    ProbeOutcome::Success(Duration::from_millis(ms))
}

pub(crate) fn fail(kind: FailureKind) -> ProbeOutcome {
    ProbeOutcome::Failure(kind)
}
