//! Workflow stages and the transition table.
//!
//! ```text
//! Idle(0) ─▶ AwaitingProcessing(1) ─▶ ScopePending(2) ─▶ ScopeConfirmed(3) ─▶ TopicsReady(4)
//!                     │                                        ▲
//!                     └──── processed + confirmed scope cached ┘
//! ```
//!
//! | From | Trigger | To |
//! |------|---------|----|
//! | Idle | `DocumentSelected` | AwaitingProcessing |
//! | AwaitingProcessing | `Processed { confirmed_scope_cached: false }` | ScopePending |
//! | AwaitingProcessing | `Processed { confirmed_scope_cached: true }` | ScopeConfirmed |
//! | ScopePending | `ScopeExtracted` / `ScopeRejected` | ScopePending |
//! | ScopePending | `ScopeConfirmed` | ScopeConfirmed |
//! | ScopeConfirmed, TopicsReady | `TemplateSelected { topics_cached }` | TopicsReady if cached, else ScopeConfirmed |
//! | ScopeConfirmed, TopicsReady | `TopicsGenerated` | TopicsReady |
//! | ScopeConfirmed, TopicsReady | `TemplateDeselected` | ScopeConfirmed |
//! | any | `DocumentChanged` | Idle |
//!
//! Selecting or deselecting a template before the scope is confirmed only
//! records the choice; the stage is unchanged. A repeated `Processed` after
//! the document has already advanced is a no-op. Every other pair is a
//! guard violation.

use serde::Serialize;
use std::fmt;

use crate::error::WorkflowError;

/// A discrete point in the workflow gating which operations are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle = 0,
    AwaitingProcessing = 1,
    ScopePending = 2,
    ScopeConfirmed = 3,
    TopicsReady = 4,
}

impl Stage {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::AwaitingProcessing => "awaiting_processing",
            Stage::ScopePending => "scope_pending",
            Stage::ScopeConfirmed => "scope_confirmed",
            Stage::TopicsReady => "topics_ready",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.ordinal())
    }
}

/// Events that may move the workflow between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DocumentSelected,
    Processed { confirmed_scope_cached: bool },
    ScopeExtracted,
    ScopeRejected,
    ScopeConfirmed,
    TemplateSelected { topics_cached: bool },
    TopicsGenerated,
    TemplateDeselected,
    DocumentChanged,
}

/// Applies one trigger to the current stage.
pub fn transition(from: Stage, trigger: Trigger) -> Result<Stage, WorkflowError> {
    use Stage as S;
    use Trigger as T;

    let to = match (from, trigger) {
        (_, T::DocumentChanged) => S::Idle,
        (S::Idle, T::DocumentSelected) => S::AwaitingProcessing,

        (
            S::AwaitingProcessing,
            T::Processed {
                confirmed_scope_cached: false,
            },
        ) => S::ScopePending,
        (
            S::AwaitingProcessing,
            T::Processed {
                confirmed_scope_cached: true,
            },
        ) => S::ScopeConfirmed,
        (S::ScopePending | S::ScopeConfirmed | S::TopicsReady, T::Processed { .. }) => from,

        (S::ScopePending, T::ScopeExtracted | T::ScopeRejected) => S::ScopePending,
        (S::ScopePending, T::ScopeConfirmed) => S::ScopeConfirmed,

        (
            S::Idle | S::AwaitingProcessing | S::ScopePending,
            T::TemplateSelected { .. } | T::TemplateDeselected,
        ) => from,
        (S::ScopeConfirmed | S::TopicsReady, T::TemplateSelected { topics_cached: true }) => {
            S::TopicsReady
        }
        (S::ScopeConfirmed | S::TopicsReady, T::TemplateSelected { topics_cached: false }) => {
            S::ScopeConfirmed
        }
        (S::ScopeConfirmed | S::TopicsReady, T::TopicsGenerated) => S::TopicsReady,
        (S::ScopeConfirmed | S::TopicsReady, T::TemplateDeselected) => S::ScopeConfirmed,

        (from, trigger) => {
            return Err(WorkflowError::guard(format!(
                "{:?} is not valid at stage {}",
                trigger, from
            )))
        }
    };
    Ok(to)
}
