//! Remote operation gateway.
//!
//! The [`Gateway`] trait exposes one async operation per capability of the
//! remote document-processing service. Implementations are pure
//! request/response: no state, no retries, no caching. Those are layered
//! above by the engine.
//!
//! Generation calls (`generate_topics`, `generate_content`, `chat`) are
//! billed and non-deterministic on the remote side. The engine guarantees
//! at most one call per logical request; implementations must not retry
//! them on their own.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_status`](Gateway::get_status) | Document processing status |
//! | [`extract_scope`](Gateway::extract_scope) | Locate the scope section |
//! | [`confirm_scope`](Gateway::confirm_scope) | Confirm scope from chosen pages |
//! | [`generate_topics`](Gateway::generate_topics) | Outline against a template |
//! | [`generate_content`](Gateway::generate_content) | Text for one topic |
//! | [`chat`](Gateway::chat) | Free-form question over document + template |
//! | [`save_content`](Gateway::save_content) | Persist edited content |

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{
    ChatTurn, DocumentId, GeneratedContent, ProcessingStatus, Scope, TemplateId, Topic,
};

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn get_status(&self, document: &DocumentId) -> Result<ProcessingStatus, RemoteError>;

    /// Returns an unconfirmed scope. `use_cache` lets the service reuse a
    /// previous extraction.
    async fn extract_scope(
        &self,
        document: &DocumentId,
        use_cache: bool,
    ) -> Result<Scope, RemoteError>;

    /// Re-extracts the scope from the given pages and marks it confirmed.
    async fn confirm_scope(
        &self,
        document: &DocumentId,
        page_numbers: &[u32],
    ) -> Result<Scope, RemoteError>;

    async fn generate_topics(
        &self,
        document: &DocumentId,
        template: &TemplateId,
    ) -> Result<Vec<Topic>, RemoteError>;

    async fn generate_content(
        &self,
        document: &DocumentId,
        template: &TemplateId,
        topic_text: &str,
        context: Option<&str>,
    ) -> Result<GeneratedContent, RemoteError>;

    /// `history` is the transcript before `message`.
    async fn chat(
        &self,
        document: &DocumentId,
        template: &TemplateId,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, RemoteError>;

    async fn save_content(
        &self,
        document: &DocumentId,
        topic_id: i64,
        content: &str,
    ) -> Result<(), RemoteError>;
}
