//! Chat over the selected document and template.
//!
//! The user turn is appended optimistically before the remote call. On
//! success the assistant turn follows it; on any failure (including a
//! cancelled future) the user turn is rolled back so the transcript never
//! holds an unanswered question. One send may be pending at a time.

use tracing::{info, warn};

use proposal_flow_core::cache::ArtifactKey;
use proposal_flow_core::error::WorkflowError;
use proposal_flow_core::models::ChatTurn;

use crate::session::{DocumentSession, StateGuard};

impl DocumentSession {
    /// Sends `message` with the prior transcript as history and returns the
    /// assistant's reply.
    pub async fn send_chat(&self, message: &str) -> Result<String, WorkflowError> {
        let message = message.trim();
        let (template, history) = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let template = st.require_topics()?;
            if message.is_empty() {
                return Err(WorkflowError::guard("message is empty"));
            }
            if st.chat_pending {
                return Err(WorkflowError::guard("a chat message is already pending"));
            }
            let history = st.transcript.clone();
            st.transcript.push(ChatTurn::user(message));
            st.chat_pending = true;
            (template, history)
        };

        let base_len = history.len();
        let rollback_template = template.clone();
        let _pending = StateGuard::new(&self.inner, move |st| {
            st.chat_pending = false;
            let unanswered = st.template.as_ref() == Some(&rollback_template)
                && st.transcript.len() == base_len + 1;
            if unanswered {
                st.transcript.truncate(base_len);
            }
        });

        info!(document = %self.document(), template = %template, turns = base_len, "sending chat message");
        let result = self
            .inner
            .gateway
            .chat(self.document(), &template, message, &history)
            .await;
        self.ensure_live()?;
        let reply = result.map_err(|e| {
            warn!(document = %self.document(), error = %e, "chat failed");
            WorkflowError::from(e)
        })?;

        let transcript = {
            let mut st = self.inner.lock();
            if st.template.as_ref() != Some(&template) || st.transcript.len() != base_len + 1 {
                return Err(WorkflowError::Stale);
            }
            st.transcript.push(ChatTurn::assistant(reply.clone()));
            st.transcript.clone()
        };
        self.persist(&ArtifactKey::transcript(self.document(), &template), &transcript)
            .await;
        Ok(reply)
    }

    /// Empties the transcript for the selected template.
    pub async fn clear_chat(&self) -> Result<(), WorkflowError> {
        let template = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let template = st
                .template
                .clone()
                .ok_or_else(|| WorkflowError::guard("no template selected"))?;
            if st.chat_pending {
                return Err(WorkflowError::guard("a chat message is pending"));
            }
            st.transcript.clear();
            template
        };
        self.cache()
            .invalidate(&ArtifactKey::transcript(self.document(), &template))
            .await
            .map_err(WorkflowError::storage)
    }
}
