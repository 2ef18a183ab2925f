//! Batch content generation.
//!
//! Generates content for every valid topic (status not `remove`) in outline
//! order. Topics with cached content or a generation already in flight are
//! skipped, so a batch over N topics of which K are done issues exactly
//! N − K remote calls. Calls are sequential with a fixed pacing delay
//! between them.
//!
//! A failure on one topic is recorded and the batch moves on. While the
//! batch runs, finished generations do not open the content viewer.

use serde::Serialize;
use tracing::{info, warn};

use proposal_flow_core::error::WorkflowError;
use proposal_flow_core::models::TopicKey;
use proposal_flow_core::stage::Stage;

use crate::progress::{BatchProgressEvent, BatchProgressReporter};
use crate::session::{DocumentSession, StateGuard};

/// Running counts of the current or last batch, for the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub active: bool,
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchProgress {
    pub fn completed(&self) -> usize {
        self.skipped + self.succeeded + self.failed
    }
}

/// Outcome of [`DocumentSession::generate_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: Vec<(TopicKey, WorkflowError)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl DocumentSession {
    /// Generates content for every valid topic that has none yet.
    ///
    /// Returns [`WorkflowError::Stale`] if the document changes mid-batch and
    /// a guard violation if the template or its topics change; per-topic
    /// failures are reported in [`BatchReport::failed`].
    pub async fn generate_all(
        &self,
        reporter: &dyn BatchProgressReporter,
    ) -> Result<BatchReport, WorkflowError> {
        let (template, targets, pending) = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let template = st.require_topics()?;
            if st.batch_active {
                return Err(WorkflowError::guard("a batch is already running"));
            }
            let targets: Vec<(TopicKey, bool)> = st
                .topics
                .iter()
                .filter(|t| !t.is_removed())
                .map(|t| {
                    let key = t.key();
                    let done = st.content.contains_key(&key)
                        || st.in_flight.contains_key(&(template.clone(), key.clone()));
                    (key, done)
                })
                .collect();
            let pending = targets.iter().filter(|(_, done)| !done).count();
            st.batch_active = true;
            st.batch = Some(BatchProgress {
                active: true,
                total: targets.len(),
                ..BatchProgress::default()
            });
            (template, targets, pending)
        };
        let _active = StateGuard::new(&self.inner, |st| {
            st.batch_active = false;
            if let Some(b) = st.batch.as_mut() {
                b.active = false;
            }
        });

        info!(document = %self.document(), total = targets.len(), pending, "batch generation started");
        reporter.report(BatchProgressEvent::Started {
            total: targets.len(),
            pending,
        });

        let mut report = BatchReport {
            total: targets.len(),
            ..BatchReport::default()
        };
        let pacing = self.inner.options.batch_pacing;
        let mut issued = 0usize;

        for (key, done) in targets {
            if done || self.content(&key).is_some() || self.is_in_flight(&key) {
                report.skipped += 1;
                self.bump(|b| b.skipped += 1);
                reporter.report(BatchProgressEvent::Skipped {
                    topic: key.to_string(),
                });
                continue;
            }

            if issued > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            self.ensure_live()?;
            if self.stage() != Stage::TopicsReady || self.template().as_ref() != Some(&template) {
                return Err(WorkflowError::guard("topics changed during batch"));
            }
            issued += 1;
            reporter.report(BatchProgressEvent::Generating {
                topic: key.to_string(),
                n: issued,
                pending,
            });

            match self.generate_content_under(Some(&template), &key).await {
                Ok(_) => {
                    report.succeeded += 1;
                    self.bump(|b| b.succeeded += 1);
                    reporter.report(BatchProgressEvent::Generated {
                        topic: key.to_string(),
                    });
                }
                Err(WorkflowError::Stale) => return Err(WorkflowError::Stale),
                Err(e) => {
                    warn!(topic = %key, error = %e, "batch item failed");
                    self.bump(|b| b.failed += 1);
                    reporter.report(BatchProgressEvent::Failed {
                        topic: key.to_string(),
                        error: e.to_string(),
                    });
                    report.failed.push((key, e));
                }
            }
        }

        info!(
            document = %self.document(),
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed.len(),
            "batch generation finished"
        );
        Ok(report)
    }

    pub fn batch_active(&self) -> bool {
        self.inner.lock().batch_active
    }

    fn bump(&self, f: impl FnOnce(&mut BatchProgress)) {
        if let Some(b) = self.inner.lock().batch.as_mut() {
            f(b);
        }
    }
}
