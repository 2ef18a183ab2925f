//! Per-document workflow session.
//!
//! A [`DocumentSession`] owns all workflow state for one open document: the
//! current [`Stage`], the latest processing status, the scope, the selected
//! template with its topics, generated content and chat transcript, the
//! in-flight generation set and the open draft. It is constructed when a
//! document is selected and retired when the document changes; there is no
//! process-wide workflow state.
//!
//! # Resumption
//!
//! Opening a session reads the artifact cache before any network request.
//! A cached confirmed scope and cached topics for the selected template let
//! the first `processed` status jump straight to
//! [`Stage::ScopeConfirmed`] / [`Stage::TopicsReady`] without re-running
//! extraction or generation.
//!
//! # Concurrency
//!
//! The session is a cheap `Clone` handle. State sits behind a
//! `std::sync::Mutex` that is never held across an `.await`. Every
//! operation re-checks the retirement flag after its remote call; a
//! response that arrives after the document changed is discarded with
//! [`WorkflowError::Stale`] and never written anywhere.
//!
//! The chat, editor and batch operations live in [`crate::chat`],
//! [`crate::editor`] and [`crate::batch`] as further `impl` blocks.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use proposal_flow_core::cache::{self, ArtifactCache, ArtifactKey, ArtifactKind};
use proposal_flow_core::error::{RemoteError, WorkflowError};
use proposal_flow_core::gateway::Gateway;
use proposal_flow_core::models::{
    ChatTurn, DocumentId, ProcessingStage, ProcessingStatus, Scope, TemplateId, Topic,
    TopicGeneration, TopicKey,
};
use proposal_flow_core::poll::PollPolicy;
use proposal_flow_core::stage::{transition, Stage, Trigger};

use crate::batch::BatchProgress;
use crate::poller::{PollUpdate, StatusWatch};

pub(crate) type SharedGeneration = Shared<BoxFuture<'static, Result<String, WorkflowError>>>;

/// Tunables a session needs from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub poll: PollPolicy,
    /// Pause between consecutive generation calls of a batch.
    pub batch_pacing: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            batch_pacing: Duration::from_millis(500),
        }
    }
}

/// The single open edit buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    pub topic: TopicKey,
    pub content: String,
}

/// Result of [`DocumentSession::extract_scope`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Extracted(Scope),
    /// A scope already existed; no remote call was made.
    AlreadyExtracted(Scope),
}

impl ExtractOutcome {
    pub fn scope(&self) -> &Scope {
        match self {
            ExtractOutcome::Extracted(s) | ExtractOutcome::AlreadyExtracted(s) => s,
        }
    }
}

/// Per-stage completion flags for a progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageFlags {
    pub processed: bool,
    pub scope_extracted: bool,
    pub scope_confirmed: bool,
    pub template_selected: bool,
    pub topics_ready: bool,
    /// Every topic not marked for removal has content.
    pub content_complete: bool,
}

/// One topic with its generation status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicView {
    #[serde(flatten)]
    pub topic: Topic,
    pub generation: TopicGeneration,
}

/// Everything the presentation layer renders, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub document: DocumentId,
    pub stage: Stage,
    pub stage_ordinal: u8,
    pub flags: StageFlags,
    pub status: Option<ProcessingStatus>,
    pub last_poll_error: Option<RemoteError>,
    pub scope: Option<Scope>,
    pub template: Option<TemplateId>,
    pub topics: Vec<TopicView>,
    pub transcript: Vec<ChatTurn>,
    pub chat_pending: bool,
    pub draft: Option<Draft>,
    pub viewer: Option<TopicKey>,
    pub batch: Option<BatchProgress>,
}

pub(crate) struct SessionState {
    pub(crate) stage: Stage,
    pub(crate) status: Option<ProcessingStatus>,
    pub(crate) last_poll_error: Option<RemoteError>,
    pub(crate) scope: Option<Scope>,
    pub(crate) scope_busy: bool,
    pub(crate) template: Option<TemplateId>,
    pub(crate) topics: Vec<Topic>,
    pub(crate) topics_busy: bool,
    /// Cache-of-record mirror for the selected template.
    pub(crate) content: BTreeMap<TopicKey, String>,
    pub(crate) in_flight: HashMap<(TemplateId, TopicKey), SharedGeneration>,
    pub(crate) transcript: Vec<ChatTurn>,
    pub(crate) chat_pending: bool,
    pub(crate) draft: Option<Draft>,
    pub(crate) viewer: Option<TopicKey>,
    pub(crate) batch_active: bool,
    pub(crate) batch: Option<BatchProgress>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            status: None,
            last_poll_error: None,
            scope: None,
            scope_busy: false,
            template: None,
            topics: Vec::new(),
            topics_busy: false,
            content: BTreeMap::new(),
            in_flight: HashMap::new(),
            transcript: Vec::new(),
            chat_pending: false,
            draft: None,
            viewer: None,
            batch_active: false,
            batch: None,
        }
    }

    pub(crate) fn advance(&mut self, trigger: Trigger) -> Result<Stage, WorkflowError> {
        let to = transition(self.stage, trigger)?;
        if to != self.stage {
            debug!(from = %self.stage, to = %to, "stage change");
        }
        self.stage = to;
        Ok(to)
    }

    /// Content generation, chat and editing need topics.
    pub(crate) fn require_topics(&self) -> Result<TemplateId, WorkflowError> {
        if self.stage < Stage::TopicsReady {
            return Err(WorkflowError::guard(format!(
                "topics have not been generated (stage {})",
                self.stage
            )));
        }
        self.template
            .clone()
            .ok_or_else(|| WorkflowError::guard("no template selected"))
    }

    pub(crate) fn topic(&self, key: &TopicKey) -> Option<&Topic> {
        self.topics.iter().find(|t| &t.key() == key)
    }

    fn generation_of(&self, topic: &Topic) -> TopicGeneration {
        let key = topic.key();
        if self.content.contains_key(&key) {
            return TopicGeneration::Cached;
        }
        let in_flight = self
            .template
            .as_ref()
            .map(|t| self.in_flight.contains_key(&(t.clone(), key)))
            .unwrap_or(false);
        if in_flight {
            TopicGeneration::InFlight
        } else {
            TopicGeneration::Pending
        }
    }

    fn apply_hydrated(&mut self, h: Hydrated) {
        self.topics = h.topics;
        self.content = h.content;
        self.transcript = h.transcript;
    }

    fn clear_template_artifacts(&mut self) {
        self.topics.clear();
        self.content.clear();
        self.transcript.clear();
        self.draft = None;
        self.viewer = None;
        self.batch = None;
    }
}

/// Artifacts read from the cache for one `(document, template)` pair.
struct Hydrated {
    topics: Vec<Topic>,
    content: BTreeMap<TopicKey, String>,
    transcript: Vec<ChatTurn>,
}

pub(crate) struct SessionInner {
    pub(crate) document: DocumentId,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) cache: Arc<dyn ArtifactCache>,
    pub(crate) options: SessionOptions,
    pub(crate) retired: Arc<AtomicBool>,
    state: Mutex<SessionState>,
}

impl SessionInner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs a cleanup against the session state when dropped.
///
/// Resets busy flags and rolls back optimistic changes on every exit path,
/// including early returns and cancelled futures.
pub(crate) struct StateGuard<'a> {
    inner: &'a SessionInner,
    cleanup: Option<Box<dyn FnOnce(&mut SessionState) + Send + 'a>>,
}

impl<'a> StateGuard<'a> {
    pub(crate) fn new(
        inner: &'a SessionInner,
        cleanup: impl FnOnce(&mut SessionState) + Send + 'a,
    ) -> Self {
        Self {
            inner,
            cleanup: Some(Box::new(cleanup)),
        }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            let mut st = self.inner.lock();
            cleanup(&mut st);
        }
    }
}

/// Handle to the workflow state of one open document.
#[derive(Clone)]
pub struct DocumentSession {
    pub(crate) inner: Arc<SessionInner>,
}

impl DocumentSession {
    /// Opens a session for `document`: hydrates from the cache, then moves
    /// from [`Stage::Idle`] to [`Stage::AwaitingProcessing`].
    pub async fn open(
        document: DocumentId,
        template: Option<TemplateId>,
        gateway: Arc<dyn Gateway>,
        cache: Arc<dyn ArtifactCache>,
        options: SessionOptions,
    ) -> Result<Self, WorkflowError> {
        let session = Self {
            inner: Arc::new(SessionInner {
                document,
                gateway,
                cache,
                options,
                retired: Arc::new(AtomicBool::new(false)),
                state: Mutex::new(SessionState::new()),
            }),
        };
        session.enter(template).await?;
        Ok(session)
    }

    async fn enter(&self, template: Option<TemplateId>) -> Result<(), WorkflowError> {
        let scope: Option<Scope> = cache::load(self.cache(), &ArtifactKey::scope(self.document()))
            .await
            .map_err(WorkflowError::storage)?;
        let hydrated = match &template {
            Some(t) => Some(self.hydrate(t).await?),
            None => None,
        };

        let mut st = self.inner.lock();
        st.scope = scope;
        st.template = template;
        if let Some(h) = hydrated {
            st.apply_hydrated(h);
        }
        st.advance(Trigger::DocumentSelected)?;
        info!(
            document = %self.document(),
            scope_cached = st.scope.is_some(),
            topics_cached = st.topics.len(),
            content_cached = st.content.len(),
            "session opened"
        );
        Ok(())
    }

    async fn hydrate(&self, template: &TemplateId) -> Result<Hydrated, WorkflowError> {
        let doc = self.document();
        let topics: Vec<Topic> = cache::load(self.cache(), &ArtifactKey::topics(doc, template))
            .await
            .map_err(WorkflowError::storage)?
            .unwrap_or_default();

        let rows = self
            .cache()
            .list(doc, Some(template), ArtifactKind::Content)
            .await
            .map_err(WorkflowError::storage)?;
        let mut content = BTreeMap::new();
        for (key, value) in rows {
            match serde_json::from_value::<String>(value) {
                Ok(text) => {
                    content.insert(TopicKey::new(key), text);
                }
                Err(e) => warn!(topic = %key, error = %e, "skipping malformed cached content"),
            }
        }

        let transcript: Vec<ChatTurn> =
            cache::load(self.cache(), &ArtifactKey::transcript(doc, template))
                .await
                .map_err(WorkflowError::storage)?
                .unwrap_or_default();

        Ok(Hydrated {
            topics,
            content,
            transcript,
        })
    }

    /// Marks the session stale and resets its state. Outstanding remote
    /// calls may still complete; their results are discarded.
    pub(crate) fn retire(&self) {
        self.inner.retired.store(true, Ordering::SeqCst);
        let mut st = self.inner.lock();
        *st = SessionState::new();
        debug!(document = %self.document(), "session retired");
    }

    pub fn is_retired(&self) -> bool {
        self.inner.retired.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), WorkflowError> {
        if self.is_retired() {
            Err(WorkflowError::Stale)
        } else {
            Ok(())
        }
    }

    pub(crate) fn cache(&self) -> &dyn ArtifactCache {
        self.inner.cache.as_ref()
    }

    /// Write-through after a successful remote call. A cache failure must
    /// not lose a result the service already produced, so it is only logged.
    pub(crate) async fn persist<T: Serialize + Sync + ?Sized>(&self, key: &ArtifactKey, value: &T) {
        if let Err(e) = cache::store(self.cache(), key, value).await {
            warn!(
                document = %key.document,
                kind = key.kind.as_str(),
                error = %format!("{:#}", e),
                "failed to write artifact cache"
            );
        }
    }

    // ============ Accessors ============

    pub fn document(&self) -> &DocumentId {
        &self.inner.document
    }

    pub fn stage(&self) -> Stage {
        self.inner.lock().stage
    }

    pub fn status(&self) -> Option<ProcessingStatus> {
        self.inner.lock().status.clone()
    }

    pub fn scope(&self) -> Option<Scope> {
        self.inner.lock().scope.clone()
    }

    pub fn template(&self) -> Option<TemplateId> {
        self.inner.lock().template.clone()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.inner.lock().topics.clone()
    }

    pub fn content(&self, key: &TopicKey) -> Option<String> {
        self.inner.lock().content.get(key).cloned()
    }

    pub fn content_map(&self) -> BTreeMap<TopicKey, String> {
        self.inner.lock().content.clone()
    }

    pub fn transcript(&self) -> Vec<ChatTurn> {
        self.inner.lock().transcript.clone()
    }

    pub fn draft(&self) -> Option<Draft> {
        self.inner.lock().draft.clone()
    }

    /// Topic whose content viewer was opened by the last individually
    /// triggered generation.
    pub fn viewer(&self) -> Option<TopicKey> {
        self.inner.lock().viewer.clone()
    }

    pub fn is_in_flight(&self, key: &TopicKey) -> bool {
        let st = self.inner.lock();
        match &st.template {
            Some(t) => st.in_flight.contains_key(&(t.clone(), key.clone())),
            None => false,
        }
    }

    pub fn topic_statuses(&self) -> Vec<TopicView> {
        let st = self.inner.lock();
        st.topics
            .iter()
            .map(|t| TopicView {
                topic: t.clone(),
                generation: st.generation_of(t),
            })
            .collect()
    }

    pub fn flags(&self) -> StageFlags {
        flags_of(&self.inner.lock())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.inner.lock();
        SessionSnapshot {
            document: self.document().clone(),
            stage: st.stage,
            stage_ordinal: st.stage.ordinal(),
            flags: flags_of(&st),
            status: st.status.clone(),
            last_poll_error: st.last_poll_error.clone(),
            scope: st.scope.clone(),
            template: st.template.clone(),
            topics: st
                .topics
                .iter()
                .map(|t| TopicView {
                    topic: t.clone(),
                    generation: st.generation_of(t),
                })
                .collect(),
            transcript: st.transcript.clone(),
            chat_pending: st.chat_pending,
            draft: st.draft.clone(),
            viewer: st.viewer.clone(),
            batch: st.batch.clone(),
        }
    }

    // ============ Processing status ============

    /// Starts a new status watch for this document. It stops by itself once
    /// the session is retired.
    pub fn watch_status(&self) -> StatusWatch {
        StatusWatch::new(
            self.inner.gateway.clone(),
            self.document().clone(),
            self.inner.options.poll,
        )
        .cancel_on(self.inner.retired.clone())
    }

    /// Applies one poll result. On `processed` the stage advances, skipping
    /// ahead when a confirmed scope and topics were hydrated from the cache.
    pub fn apply_status(&self, status: ProcessingStatus) -> Result<Stage, WorkflowError> {
        self.ensure_live()?;
        let mut st = self.inner.lock();
        let processed = status.stage == ProcessingStage::Processed;
        st.status = Some(status);
        st.last_poll_error = None;

        if processed && st.stage == Stage::AwaitingProcessing {
            let confirmed = st.scope.as_ref().map(|s| s.confirmed).unwrap_or(false);
            st.advance(Trigger::Processed {
                confirmed_scope_cached: confirmed,
            })?;
            if st.template.is_some() {
                let topics_cached = !st.topics.is_empty();
                st.advance(Trigger::TemplateSelected { topics_cached })?;
            }
        }
        Ok(st.stage)
    }

    pub(crate) fn record_poll_failure(&self, error: &RemoteError) {
        self.inner.lock().last_poll_error = Some(error.clone());
    }

    /// Polls until the document reaches a terminal stage, applying every
    /// status. Returns the terminal status (which may be `error`).
    pub async fn await_processed(
        &self,
        mut on_update: impl FnMut(&PollUpdate),
    ) -> Result<ProcessingStatus, WorkflowError> {
        let mut watch = self.watch_status();
        let mut last_error = None;

        while let Some(update) = watch.next().await {
            on_update(&update);
            match update {
                PollUpdate::Status(status) => {
                    let terminal = status.stage.is_terminal();
                    self.apply_status(status.clone())?;
                    if terminal {
                        return Ok(status);
                    }
                }
                PollUpdate::TransportFailure { consecutive, error } => {
                    warn!(document = %self.document(), consecutive, error = %error, "status poll failed");
                    self.record_poll_failure(&error);
                    last_error = Some(error);
                }
            }
        }

        self.ensure_live()?;
        Err(match last_error {
            Some(e) => WorkflowError::Transport(e),
            None => WorkflowError::guard("status polling stopped before a terminal stage"),
        })
    }

    // ============ Scope ============

    /// Extracts the scope. Only valid once the document is processed; a
    /// second call returns the existing scope without a remote call.
    pub async fn extract_scope(&self, use_cache: bool) -> Result<ExtractOutcome, WorkflowError> {
        {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let processed = st
                .status
                .as_ref()
                .map(|s| s.stage == ProcessingStage::Processed)
                .unwrap_or(false);
            if !processed || st.stage < Stage::ScopePending {
                return Err(WorkflowError::guard("document has not finished processing"));
            }
            if let Some(scope) = &st.scope {
                debug!(document = %self.document(), "scope already extracted");
                return Ok(ExtractOutcome::AlreadyExtracted(scope.clone()));
            }
            if st.scope_busy {
                return Err(WorkflowError::guard("scope request already in progress"));
            }
            st.scope_busy = true;
        }
        let _busy = StateGuard::new(&self.inner, |st| st.scope_busy = false);

        info!(document = %self.document(), use_cache, "extracting scope");
        let result = self
            .inner
            .gateway
            .extract_scope(self.document(), use_cache)
            .await;
        self.ensure_live()?;
        let mut scope = result.map_err(|e| {
            warn!(document = %self.document(), error = %e, "scope extraction failed");
            WorkflowError::from(e)
        })?;
        scope.confirmed = false;

        {
            let mut st = self.inner.lock();
            st.scope = Some(scope.clone());
            st.advance(Trigger::ScopeExtracted)?;
        }
        self.persist(&ArtifactKey::scope(self.document()), &scope)
            .await;
        Ok(ExtractOutcome::Extracted(scope))
    }

    /// Discards an unconfirmed scope so it can be re-extracted or replaced
    /// by a manual page selection.
    pub async fn reject_scope(&self) -> Result<(), WorkflowError> {
        {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            match &st.scope {
                None => return Err(WorkflowError::guard("no scope has been extracted")),
                Some(s) if s.confirmed => {
                    return Err(WorkflowError::guard("scope is already confirmed"))
                }
                Some(_) => {}
            }
            if st.scope_busy {
                return Err(WorkflowError::guard("scope request already in progress"));
            }
            st.advance(Trigger::ScopeRejected)?;
            st.scope = None;
        }
        self.cache()
            .invalidate(&ArtifactKey::scope(self.document()))
            .await
            .map_err(WorkflowError::storage)
    }

    /// Confirms the extracted scope, optionally with a manual page
    /// selection (defaults to the scope's source pages).
    pub async fn confirm_scope(&self, pages: Option<Vec<u32>>) -> Result<Scope, WorkflowError> {
        let pages = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let scope = st
                .scope
                .as_ref()
                .ok_or_else(|| WorkflowError::guard("no scope has been extracted"))?;
            if scope.confirmed || st.stage != Stage::ScopePending {
                return Err(WorkflowError::guard(format!(
                    "scope cannot be confirmed at stage {}",
                    st.stage
                )));
            }
            let mut pages = pages.unwrap_or_else(|| scope.source_pages.clone());
            pages.sort_unstable();
            pages.dedup();
            pages.retain(|p| *p > 0);
            if pages.is_empty() {
                return Err(WorkflowError::guard("no pages selected"));
            }
            if st.scope_busy {
                return Err(WorkflowError::guard("scope request already in progress"));
            }
            st.scope_busy = true;
            pages
        };
        let _busy = StateGuard::new(&self.inner, |st| st.scope_busy = false);

        info!(document = %self.document(), ?pages, "confirming scope");
        let result = self
            .inner
            .gateway
            .confirm_scope(self.document(), &pages)
            .await;
        self.ensure_live()?;
        let mut scope = result.map_err(|e| {
            warn!(document = %self.document(), error = %e, "scope confirmation failed");
            WorkflowError::from(e)
        })?;
        scope.confirmed = true;
        if scope.source_pages.is_empty() {
            scope.source_pages = pages;
        }

        {
            let mut st = self.inner.lock();
            st.scope = Some(scope.clone());
            st.advance(Trigger::ScopeConfirmed)?;
            if st.template.is_some() {
                let topics_cached = !st.topics.is_empty();
                st.advance(Trigger::TemplateSelected { topics_cached })?;
            }
        }
        self.persist(&ArtifactKey::scope(self.document()), &scope)
            .await;
        Ok(scope)
    }

    // ============ Template & topics ============

    /// Selects (or with `None` deselects) the template.
    ///
    /// Topics, content, transcript and draft of the previous template are
    /// dropped from the session (they stay cached). A newly selected
    /// template is hydrated from the cache first; the stage lands on
    /// `TopicsReady` when topics were found, else on `ScopeConfirmed`.
    pub async fn select_template(&self, template: Option<TemplateId>) -> Result<Stage, WorkflowError> {
        self.ensure_live()?;
        if self.template() == template {
            return Ok(self.stage());
        }
        let hydrated = match &template {
            Some(t) => Some(self.hydrate(t).await?),
            None => None,
        };
        self.ensure_live()?;

        let mut st = self.inner.lock();
        st.clear_template_artifacts();
        st.template = template.clone();
        let stage = match hydrated {
            Some(h) => {
                let topics_cached = !h.topics.is_empty();
                st.apply_hydrated(h);
                st.advance(Trigger::TemplateSelected { topics_cached })?
            }
            None => st.advance(Trigger::TemplateDeselected)?,
        };
        info!(
            document = %self.document(),
            template = template.as_ref().map(|t| t.as_str()).unwrap_or("-"),
            topics = st.topics.len(),
            %stage,
            "template selected"
        );
        Ok(stage)
    }

    /// Generates the topic outline for the selected template.
    ///
    /// Requires a confirmed scope. Without `force`, existing topics are
    /// returned as they are; with `force` the whole sequence is replaced.
    pub async fn generate_topics(&self, force: bool) -> Result<Vec<Topic>, WorkflowError> {
        let template = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let confirmed = st.scope.as_ref().map(|s| s.confirmed).unwrap_or(false);
            if !confirmed || st.stage < Stage::ScopeConfirmed {
                return Err(WorkflowError::guard("scope has not been confirmed"));
            }
            let template = st
                .template
                .clone()
                .ok_or_else(|| WorkflowError::guard("no template selected"))?;
            if !force && !st.topics.is_empty() {
                return Ok(st.topics.clone());
            }
            if st.topics_busy {
                return Err(WorkflowError::guard("topic generation already in progress"));
            }
            st.topics_busy = true;
            template
        };
        let _busy = StateGuard::new(&self.inner, |st| st.topics_busy = false);

        info!(document = %self.document(), template = %template, "generating topics");
        let result = self
            .inner
            .gateway
            .generate_topics(self.document(), &template)
            .await;
        self.ensure_live()?;
        let topics = result.map_err(|e| {
            warn!(document = %self.document(), error = %e, "topic generation failed");
            WorkflowError::from(e)
        })?;

        {
            let mut st = self.inner.lock();
            if st.template.as_ref() == Some(&template) {
                st.topics = topics.clone();
                st.advance(Trigger::TopicsGenerated)?;
            }
        }
        self.persist(&ArtifactKey::topics(self.document(), &template), &topics)
            .await;
        Ok(topics)
    }

    // ============ Content generation ============

    /// Returns content for one topic, generating it if needed.
    ///
    /// Cached content is returned without a remote call. A request for a
    /// topic that is already in flight awaits that request instead of
    /// issuing another.
    pub async fn generate_content(&self, key: &TopicKey) -> Result<String, WorkflowError> {
        self.generate_content_under(None, key).await
    }

    /// Like [`generate_content`](Self::generate_content), but refuses to run
    /// unless `expected` is still the selected template.
    pub(crate) async fn generate_content_under(
        &self,
        expected: Option<&TemplateId>,
        key: &TopicKey,
    ) -> Result<String, WorkflowError> {
        let pending = {
            let mut st = self.inner.lock();
            self.ensure_live()?;
            let template = st.require_topics()?;
            if let Some(expected) = expected {
                if expected != &template {
                    return Err(WorkflowError::guard(format!(
                        "template changed from '{}' to '{}'",
                        expected, template
                    )));
                }
            }
            let topic = st
                .topic(key)
                .cloned()
                .ok_or_else(|| WorkflowError::guard(format!("unknown topic '{}'", key)))?;
            if let Some(content) = st.content.get(key) {
                debug!(topic = %key, "content cache hit");
                return Ok(content.clone());
            }
            let slot = (template.clone(), key.clone());
            match st.in_flight.get(&slot) {
                Some(existing) => {
                    debug!(topic = %key, "joining in-flight generation");
                    existing.clone()
                }
                None => {
                    // Spawned so the slot is released even if every caller
                    // stops waiting.
                    let task = tokio::spawn(self.clone().run_generation(template, topic));
                    let session = self.clone();
                    let released = slot.clone();
                    let generation = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => {
                                session.inner.lock().in_flight.remove(&released);
                                warn!(topic = %released.1, error = %e, "content generation task failed");
                                Err(WorkflowError::Transport(RemoteError::new(
                                    "task_failed",
                                    e.to_string(),
                                )))
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    st.in_flight.insert(slot, generation.clone());
                    generation
                }
            }
        };
        pending.await
    }

    async fn run_generation(self, template: TemplateId, topic: Topic) -> Result<String, WorkflowError> {
        let key = topic.key();
        let document = self.document().clone();
        info!(document = %document, template = %template, topic = %key, "generating content");
        let result = self
            .inner
            .gateway
            .generate_content(&document, &template, &topic.heading(), None)
            .await;

        let content = {
            let mut st = self.inner.lock();
            st.in_flight.remove(&(template.clone(), key.clone()));
            if self.is_retired() {
                debug!(topic = %key, "discarding content for a retired session");
                return Err(WorkflowError::Stale);
            }
            match result {
                Ok(generated) => {
                    if st.template.as_ref() == Some(&template) {
                        st.content.insert(key.clone(), generated.content.clone());
                        if !st.batch_active {
                            st.viewer = Some(key.clone());
                        }
                    }
                    generated.content
                }
                Err(e) => {
                    warn!(topic = %key, error = %e, "content generation failed");
                    return Err(e.into());
                }
            }
        };
        self.persist(
            &ArtifactKey::content(&document, &template, key.as_str()),
            &content,
        )
        .await;
        Ok(content)
    }
}

fn flags_of(st: &SessionState) -> StageFlags {
    let live: Vec<&Topic> = st.topics.iter().filter(|t| !t.is_removed()).collect();
    StageFlags {
        processed: st
            .status
            .as_ref()
            .map(|s| s.stage == ProcessingStage::Processed)
            .unwrap_or(false)
            || st.stage >= Stage::ScopePending,
        scope_extracted: st.scope.is_some(),
        scope_confirmed: st.stage >= Stage::ScopeConfirmed,
        template_selected: st.template.is_some(),
        topics_ready: st.stage == Stage::TopicsReady,
        content_complete: st.stage == Stage::TopicsReady
            && !live.is_empty()
            && live.iter().all(|t| st.content.contains_key(&t.key())),
    }
}
