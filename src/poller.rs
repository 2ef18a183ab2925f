//! Processing-status watch.
//!
//! [`StatusWatch`] is a pull-based stream of status updates for one
//! document. Each call to [`next`](StatusWatch::next) waits the delay that
//! [`PollPolicy::next_delay`] chose for the previous observation, issues one
//! status request and yields the outcome. It ends:
//!
//! - after yielding a terminal status (`processed` / `error`),
//! - after the transport-failure budget is exhausted,
//! - as soon as its cancel flag is set (the session was retired).
//!
//! Updates are yielded, not applied; the consumer decides what to do with
//! them (see [`DocumentSession::await_processed`](crate::session::DocumentSession::await_processed)).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use proposal_flow_core::error::RemoteError;
use proposal_flow_core::gateway::Gateway;
use proposal_flow_core::models::{DocumentId, ProcessingStatus};
use proposal_flow_core::poll::{PollDecision, PollObservation, PollPolicy};

/// One outcome of a status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    Status(ProcessingStatus),
    /// The status request failed; polling continues with backoff.
    TransportFailure { consecutive: u32, error: RemoteError },
}

pub struct StatusWatch {
    gateway: Arc<dyn Gateway>,
    document: DocumentId,
    policy: PollPolicy,
    cancel: Option<Arc<AtomicBool>>,
    last: Option<PollObservation>,
    failures: u32,
    done: bool,
}

impl StatusWatch {
    pub fn new(gateway: Arc<dyn Gateway>, document: DocumentId, policy: PollPolicy) -> Self {
        Self {
            gateway,
            document,
            policy,
            cancel: None,
            last: None,
            failures: 0,
            done: false,
        }
    }

    /// Stops the watch once `flag` is set.
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    /// Waits for and returns the next update, or `None` once the watch has
    /// ended. The first poll is issued immediately.
    pub async fn next(&mut self) -> Option<PollUpdate> {
        if self.done || self.cancelled() {
            self.done = true;
            return None;
        }

        if let Some(last) = &self.last {
            match self.policy.next_delay(last) {
                PollDecision::Stop => {
                    debug!(document = %self.document, "status watch finished");
                    self.done = true;
                    return None;
                }
                PollDecision::Continue(delay) => tokio::time::sleep(delay).await,
            }
            if self.cancelled() {
                self.done = true;
                return None;
            }
        }

        let result = self.gateway.get_status(&self.document).await;
        if self.cancelled() {
            debug!(document = %self.document, "dropping status for a retired session");
            self.done = true;
            return None;
        }

        match result {
            Ok(status) => {
                self.failures = 0;
                self.last = Some(PollObservation::Status(status.stage));
                Some(PollUpdate::Status(status))
            }
            Err(error) => {
                self.failures += 1;
                self.last = Some(PollObservation::TransportFailure {
                    consecutive: self.failures,
                });
                Some(PollUpdate::TransportFailure {
                    consecutive: self.failures,
                    error,
                })
            }
        }
    }

    /// Drains the watch, returning every update it produced.
    pub async fn collect(mut self) -> Vec<PollUpdate> {
        let mut out = Vec::new();
        while let Some(update) = self.next().await {
            out.push(update);
        }
        out
    }
}
