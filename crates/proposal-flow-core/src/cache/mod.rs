//! Artifact cache abstraction.
//!
//! The [`ArtifactCache`] trait stores expensive generated artifacts (scope,
//! topics, per-topic content, chat transcript) keyed by
//! `(document, template?, kind, key)` so they survive navigation and process
//! restarts without being regenerated. It is the only resource shared
//! between the engine's components.
//!
//! Values are stored as JSON; [`load`] and [`store`] add typed access.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{DocumentId, TemplateId};

/// Kind of cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Per document. One entry.
    Scope,
    /// Per document and template. One entry holding the ordered sequence.
    Topics,
    /// Per document and template. One entry per topic key.
    Content,
    /// Per document and template. One entry holding the transcript.
    Transcript,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Scope => "scope",
            ArtifactKind::Topics => "topics",
            ArtifactKind::Content => "content",
            ArtifactKind::Transcript => "transcript",
        }
    }
}

/// Full address of one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub document: DocumentId,
    pub template: Option<TemplateId>,
    pub kind: ArtifactKind,
    /// Distinguishes entries of the same kind; empty for single-entry kinds.
    pub key: String,
}

impl ArtifactKey {
    pub fn scope(document: &DocumentId) -> Self {
        Self {
            document: document.clone(),
            template: None,
            kind: ArtifactKind::Scope,
            key: String::new(),
        }
    }

    pub fn topics(document: &DocumentId, template: &TemplateId) -> Self {
        Self {
            document: document.clone(),
            template: Some(template.clone()),
            kind: ArtifactKind::Topics,
            key: String::new(),
        }
    }

    pub fn content(document: &DocumentId, template: &TemplateId, topic: &str) -> Self {
        Self {
            document: document.clone(),
            template: Some(template.clone()),
            kind: ArtifactKind::Content,
            key: topic.to_string(),
        }
    }

    pub fn transcript(document: &DocumentId, template: &TemplateId) -> Self {
        Self {
            document: document.clone(),
            template: Some(template.clone()),
            kind: ArtifactKind::Transcript,
            key: String::new(),
        }
    }
}

/// Keyed store of generated artifacts with explicit invalidation.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](ArtifactCache::get) | Read one entry |
/// | [`put`](ArtifactCache::put) | Insert or replace one entry |
/// | [`invalidate`](ArtifactCache::invalidate) | Remove one entry |
/// | [`list`](ArtifactCache::list) | All entries of a kind, ordered by key |
/// | [`invalidate_document`](ArtifactCache::invalidate_document) | Remove everything for a document |
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn get(&self, key: &ArtifactKey) -> Result<Option<Value>>;

    async fn put(&self, key: &ArtifactKey, value: &Value) -> Result<()>;

    async fn invalidate(&self, key: &ArtifactKey) -> Result<()>;

    async fn list(
        &self,
        document: &DocumentId,
        template: Option<&TemplateId>,
        kind: ArtifactKind,
    ) -> Result<Vec<(String, Value)>>;

    /// Returns the number of entries removed.
    async fn invalidate_document(&self, document: &DocumentId) -> Result<u64>;
}

/// Read and deserialize one entry.
pub async fn load<T: DeserializeOwned>(
    cache: &dyn ArtifactCache,
    key: &ArtifactKey,
) -> Result<Option<T>> {
    match cache.get(key).await? {
        Some(value) => {
            let parsed = serde_json::from_value(value).with_context(|| {
                format!(
                    "Malformed cached {} for document '{}'",
                    key.kind.as_str(),
                    key.document
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Serialize and write one entry.
pub async fn store<T: Serialize + ?Sized>(
    cache: &dyn ArtifactCache,
    key: &ArtifactKey,
    value: &T,
) -> Result<()> {
    let json = serde_json::to_value(value)?;
    cache.put(key, &json).await
}
