//! Workflow engine: owns the active document session.
//!
//! At most one [`DocumentSession`] is active. Selecting a different
//! document retires the previous session before the new one is opened, so
//! any response still outstanding for the old document is discarded.

use std::sync::Arc;

use tracing::info;

use proposal_flow_core::cache::ArtifactCache;
use proposal_flow_core::error::WorkflowError;
use proposal_flow_core::gateway::Gateway;
use proposal_flow_core::models::{DocumentId, TemplateId};
use proposal_flow_core::stage::Stage;

use crate::config::Config;
use crate::session::{DocumentSession, SessionOptions};

pub struct WorkflowEngine {
    gateway: Arc<dyn Gateway>,
    cache: Arc<dyn ArtifactCache>,
    options: SessionOptions,
    active: Option<DocumentSession>,
}

impl WorkflowEngine {
    pub fn new(gateway: Arc<dyn Gateway>, cache: Arc<dyn ArtifactCache>) -> Self {
        Self {
            gateway,
            cache,
            options: SessionOptions::default(),
            active: None,
        }
    }

    /// Takes poll and batch tunables from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.options = SessionOptions {
            poll: config.poll.policy(),
            batch_pacing: config.batch.pacing(),
        };
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Makes `document` the active document.
    ///
    /// Re-selecting the active document with the same template returns the
    /// existing session unchanged.
    pub async fn select_document(
        &mut self,
        document: DocumentId,
        template: Option<TemplateId>,
    ) -> Result<DocumentSession, WorkflowError> {
        if let Some(current) = &self.active {
            if current.document() == &document {
                if current.template() != template {
                    current.select_template(template).await?;
                }
                return Ok(current.clone());
            }
        }
        self.close();

        let session = DocumentSession::open(
            document,
            template,
            self.gateway.clone(),
            self.cache.clone(),
            self.options,
        )
        .await?;
        self.active = Some(session.clone());
        Ok(session)
    }

    pub fn active(&self) -> Option<&DocumentSession> {
        self.active.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.active
            .as_ref()
            .map(|s| s.stage())
            .unwrap_or(Stage::Idle)
    }

    /// Retires the active session, if any.
    pub fn close(&mut self) {
        if let Some(previous) = self.active.take() {
            info!(document = %previous.document(), "closing document");
            previous.retire();
        }
    }

    /// Drops every cached artifact for `document`. When it is the active
    /// document the session is reopened from scratch.
    pub async fn forget_document(&mut self, document: &DocumentId) -> Result<u64, WorkflowError> {
        let reopen = match &self.active {
            Some(s) if s.document() == document => {
                let template = s.template();
                self.close();
                Some(template)
            }
            _ => None,
        };

        let removed = self
            .cache
            .invalidate_document(document)
            .await
            .map_err(WorkflowError::storage)?;
        info!(document = %document, removed, "forgot cached artifacts");

        if let Some(template) = reopen {
            self.select_document(document.clone(), template).await?;
        }
        Ok(removed)
    }
}
