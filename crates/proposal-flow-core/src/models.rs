//! Core data models shared by the workflow engine.
//!
//! These types describe what flows between the remote service, the
//! artifact cache and the session: processing status, the extracted scope,
//! generated topics, chat turns and per-topic content.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one uploaded document (the filename the remote service knows).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a template (a named table-of-contents specification).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote processing stage of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Pending,
    Uploading,
    Processing,
    Processed,
    Error,
}

impl ProcessingStage {
    /// `processed` and `error` end polling.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStage::Processed | ProcessingStage::Error)
    }

    /// Maps the service's wire value. Unknown values (including
    /// `not_processed`) are treated as pending.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "uploading" => ProcessingStage::Uploading,
            "processing" => ProcessingStage::Processing,
            "processed" => ProcessingStage::Processed,
            "error" => ProcessingStage::Error,
            _ => ProcessingStage::Pending,
        }
    }
}

/// Latest known processing status of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub stage: ProcessingStage,
    pub message: String,
    /// Percentage in `0..=100` when the service reports one.
    #[serde(default)]
    pub progress: Option<u8>,
    /// Total page count, known once text extraction has run.
    #[serde(default)]
    pub pages: Option<u32>,
}

impl ProcessingStatus {
    pub fn new(stage: ProcessingStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: None,
            pages: None,
        }
    }
}

/// The portion of a document designated as in scope for proposal generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub text: String,
    pub source_pages: Vec<u32>,
    pub confirmed: bool,
    /// `false` when the service found no clear scope section; the user is
    /// then expected to confirm a manual page selection.
    #[serde(default = "default_true")]
    pub is_complete: bool,
}

fn default_true() -> bool {
    true
}

/// Annotation attached to a generated topic by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    #[default]
    Keep,
    /// No evidence in the document; excluded from generation and export.
    Remove,
    /// Found in the document but absent from the template.
    Add,
}

/// Content and in-flight lookups key off this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structured outline entry generated against a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub number: Option<String>,
    pub text: String,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub status: TopicStatus,
}

impl Topic {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            number: None,
            text: text.into(),
            level: None,
            page: None,
            status: TopicStatus::Keep,
        }
    }

    /// Identity of a topic.
    ///
    /// Topics are identified by their text, not their optional server id.
    /// Every cache and in-flight lookup goes through this accessor.
    pub fn key(&self) -> TopicKey {
        TopicKey::new(self.text.clone())
    }

    /// Heading as displayed and sent to the service: `"3.1 Propulsion"`.
    pub fn heading(&self) -> String {
        match self.number.as_deref() {
            Some(n) if !n.is_empty() => format!("{} {}", n, self.text),
            _ => self.text.clone(),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.status == TopicStatus::Remove
    }
}

/// Result of a content-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub topic: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Generation status of one topic, as shown next to it in the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicGeneration {
    Cached,
    InFlight,
    Pending,
}
