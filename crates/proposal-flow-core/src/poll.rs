//! Status poll policy.
//!
//! A pure function from the last poll observation to the next delay, kept
//! apart from any timer or rendering concern:
//!
//! - non-terminal status → poll again after `interval`
//! - terminal status (`processed` / `error`) → stop
//! - n-th consecutive transport failure → back off
//!   `min(interval * 2^(n-1), max_backoff)` while `n <= max_transport_failures`,
//!   then stop

use std::time::Duration;

use crate::models::ProcessingStage;

/// Tunables for status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_backoff: Duration,
    pub max_transport_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_backoff: Duration::from_secs(60),
            max_transport_failures: 5,
        }
    }
}

/// What the last poll produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollObservation {
    Status(ProcessingStage),
    /// `consecutive` counts failures since the last successful poll (>= 1).
    TransportFailure { consecutive: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Continue(Duration),
    Stop,
}

impl PollPolicy {
    pub fn next_delay(&self, last: &PollObservation) -> PollDecision {
        match *last {
            PollObservation::Status(stage) if stage.is_terminal() => PollDecision::Stop,
            PollObservation::Status(_) => PollDecision::Continue(self.interval),
            PollObservation::TransportFailure { consecutive } => {
                if consecutive > self.max_transport_failures {
                    return PollDecision::Stop;
                }
                let exp = consecutive.saturating_sub(1).min(16);
                let delay = self.interval.saturating_mul(1u32 << exp);
                PollDecision::Continue(delay.min(self.max_backoff))
            }
        }
    }
}
