//! # Proposal Flow Core
//!
//! Runtime-free logic for proposal-flow: the workflow data model, the stage
//! transition table, the status poll policy, the error taxonomy and the two
//! seams the engine is built on (the remote [`gateway::Gateway`] and the
//! [`cache::ArtifactCache`]).
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem dependencies.

pub mod cache;
pub mod error;
pub mod gateway;
pub mod models;
pub mod poll;
pub mod stage;
