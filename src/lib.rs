//! # Proposal Flow
//!
//! Client-side workflow engine for a remote document-analysis service.
//!
//! A user uploads a requirements document; the service processes it,
//! extracts a scope, generates a topic outline against a template, then
//! generates per-topic content. This crate drives that workflow as a stage
//! machine, caches every generated artifact so no billed call is repeated,
//! polls processing status, generates content in batches, manages a chat
//! transcript and saves edited content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  CLI (pflow) │──▶│  WorkflowEngine  │──▶│ HttpGateway  │──▶ service
//! └──────────────┘   │  DocumentSession │   └──────────────┘
//!                    │  stage machine   │   ┌──────────────┐
//!                    │  batch/chat/edit │──▶│ SqliteCache  │
//!                    └──────────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`http_gateway`] | reqwest implementation of the gateway |
//! | [`sqlite_cache`] | SQLite artifact cache |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`engine`] | Active-document ownership |
//! | [`session`] | Per-document state, scope, topics, content generation |
//! | [`poller`] | Processing-status watch |
//! | [`batch`] | Generate content for all topics |
//! | [`progress`] | Batch progress reporting |
//! | [`chat`] | Chat transcript |
//! | [`editor`] | Draft editing and saving |
//! | [`export`] | Markdown export |
//! | [`logging`] | Tracing subscriber setup |
//!
//! Runtime-free types (models, errors, the [`gateway::Gateway`] and
//! [`cache::ArtifactCache`] traits, the stage table and poll policy) live in
//! `proposal-flow-core` and are re-exported here.

pub mod batch;
pub mod chat;
pub mod config;
pub mod db;
pub mod editor;
pub mod engine;
pub mod export;
pub mod http_gateway;
pub mod logging;
pub mod migrate;
pub mod poller;
pub mod progress;
pub mod session;
pub mod sqlite_cache;

pub use proposal_flow_core::{cache, error, gateway, models, poll, stage};
