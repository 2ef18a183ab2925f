//! Error taxonomy of the workflow engine.
//!
//! - [`RemoteError`]: a failed gateway call (network, HTTP status, bad body).
//! - [`WorkflowError`]: what every engine operation returns on failure.
//! - [`IdentityMissing`]: not an error; reported by a save that could only
//!   reach the local cache because the topic has no server id.
//!
//! Nothing here is fatal. Every failure is scoped to one operation.

use serde::Serialize;
use std::fmt;

use crate::models::TopicKey;

/// Failure reported by the remote gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Short machine-readable code, e.g. `http_404`, `network`, `timeout`, `decode`.
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(format!("http_{}", status), message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new("network", message)
    }
}

/// Failure of a workflow operation.
///
/// `Clone` so a single in-flight generation can hand the same outcome to
/// every caller awaiting it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// The remote call failed. Recoverable by re-triggering the operation.
    #[error("remote call failed: {0}")]
    Transport(#[from] RemoteError),

    /// Operation attempted outside the stage where it is valid.
    #[error("not allowed: {0}")]
    GuardViolation(String),

    /// The session was retired (document changed) before the response
    /// arrived; the response was discarded.
    #[error("response discarded: document changed")]
    Stale,

    /// The artifact cache failed.
    #[error("cache error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn guard(msg: impl Into<String>) -> Self {
        WorkflowError::GuardViolation(msg.into())
    }

    pub fn storage(err: anyhow::Error) -> Self {
        WorkflowError::Storage(format!("{:#}", err))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, WorkflowError::Transport(_))
    }

    pub fn is_guard_violation(&self) -> bool {
        matches!(self, WorkflowError::GuardViolation(_))
    }
}

/// A save reached only the local cache because the topic lacks a server id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityMissing {
    pub topic: TopicKey,
}

impl fmt::Display for IdentityMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic '{}' has no server id; saved to local cache only",
            self.topic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display() {
        let e = RemoteError::http(503, "service unavailable");
        assert_eq!(e.to_string(), "http_503: service unavailable");
        let w: WorkflowError = e.into();
        assert!(w.is_transport());
        assert_eq!(
            w.to_string(),
            "remote call failed: http_503: service unavailable"
        );
    }
}
