//! Content editing and saving.
//!
//! One draft at a time, opened over a topic's generated content. Saving
//! commits the draft to the local cache first, then persists it remotely
//! when the topic carries a server id. A topic without one is saved to the
//! cache only and reported as [`SaveOutcome::CacheOnly`].

use serde::Serialize;
use tracing::{info, warn};

use proposal_flow_core::cache::{self, ArtifactKey};
use proposal_flow_core::error::{IdentityMissing, WorkflowError};
use proposal_flow_core::models::TopicKey;

use crate::session::{DocumentSession, Draft};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// Committed locally and accepted by the service.
    Persisted,
    CacheOnly(IdentityMissing),
}

/// Outcome of [`DocumentSession::save_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveAllReport {
    pub persisted: Vec<TopicKey>,
    pub cache_only: Vec<TopicKey>,
    pub failed: Vec<(TopicKey, WorkflowError)>,
}

impl DocumentSession {
    /// Opens the draft for `topic` over its current content, replacing any
    /// open draft.
    pub fn open_draft(&self, topic: &TopicKey) -> Result<Draft, WorkflowError> {
        let mut st = self.inner.lock();
        self.ensure_live()?;
        st.require_topics()?;
        if topic.is_empty() {
            return Err(WorkflowError::guard("topic key is empty"));
        }
        let content = st
            .content
            .get(topic)
            .cloned()
            .ok_or_else(|| WorkflowError::guard(format!("no content for topic '{}'", topic)))?;
        let draft = Draft {
            topic: topic.clone(),
            content,
        };
        st.draft = Some(draft.clone());
        Ok(draft)
    }

    pub fn update_draft(&self, content: impl Into<String>) -> Result<(), WorkflowError> {
        let mut st = self.inner.lock();
        self.ensure_live()?;
        let draft = st
            .draft
            .as_mut()
            .ok_or_else(|| WorkflowError::guard("no draft is open"))?;
        draft.content = content.into();
        Ok(())
    }

    /// Discards the draft. Committed content is untouched.
    pub fn cancel_draft(&self) -> Option<Draft> {
        self.inner.lock().draft.take()
    }

    /// Saves the open draft.
    ///
    /// The local commit happens before the remote call and survives a
    /// remote failure, which is returned as [`WorkflowError::Transport`].
    pub async fn save_draft(&self) -> Result<SaveOutcome, WorkflowError> {
        let draft = {
            let st = self.inner.lock();
            self.ensure_live()?;
            st.draft
                .clone()
                .ok_or_else(|| WorkflowError::guard("no draft is open"))?
        };
        self.save_content(&draft.topic, draft.content).await
    }

    /// Commits `content` for `topic` and persists it remotely when possible.
    pub async fn save_content(
        &self,
        topic: &TopicKey,
        content: String,
    ) -> Result<SaveOutcome, WorkflowError> {
        if topic.is_empty() {
            return Err(WorkflowError::guard("topic key is empty"));
        }
        let (template, topic_id) = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let template = st.require_topics()?;
            let topic_id = st
                .topic(topic)
                .ok_or_else(|| WorkflowError::guard(format!("unknown topic '{}'", topic)))?
                .id;
            st.content.insert(topic.clone(), content.clone());
            if let Some(d) = st.draft.as_mut().filter(|d| &d.topic == topic) {
                d.content = content.clone();
            }
            (template, topic_id)
        };

        cache::store(
            self.cache(),
            &ArtifactKey::content(self.document(), &template, topic.as_str()),
            &content,
        )
        .await
        .map_err(WorkflowError::storage)?;

        let Some(id) = topic_id else {
            info!(topic = %topic, "saved to cache only: topic has no server id");
            return Ok(SaveOutcome::CacheOnly(IdentityMissing {
                topic: topic.clone(),
            }));
        };

        self.inner
            .gateway
            .save_content(self.document(), id, &content)
            .await
            .map_err(|e| {
                warn!(topic = %topic, error = %e, "remote save failed; kept local commit");
                WorkflowError::from(e)
            })?;
        info!(topic = %topic, id, "content saved");
        Ok(SaveOutcome::Persisted)
    }

    /// Saves the committed content of every valid topic.
    pub async fn save_all(&self) -> Result<SaveAllReport, WorkflowError> {
        let items: Vec<(TopicKey, String)> = {
            let st = self.inner.lock();
            self.ensure_live()?;
            st.require_topics()?;
            st.topics
                .iter()
                .filter(|t| !t.is_removed())
                .filter_map(|t| {
                    let key = t.key();
                    st.content.get(&key).map(|c| (key, c.clone()))
                })
                .collect()
        };

        let mut report = SaveAllReport::default();
        for (key, content) in items {
            match self.save_content(&key, content).await {
                Ok(SaveOutcome::Persisted) => report.persisted.push(key),
                Ok(SaveOutcome::CacheOnly(_)) => report.cache_only.push(key),
                Err(WorkflowError::Stale) => return Err(WorkflowError::Stale),
                Err(e) => report.failed.push((key, e)),
            }
        }
        Ok(report)
    }
}
