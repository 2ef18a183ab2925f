//! Scripted gateway and helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use proposal_flow::cache::memory::InMemoryCache;
use proposal_flow::cache::ArtifactCache;
use proposal_flow::engine::WorkflowEngine;
use proposal_flow::error::RemoteError;
use proposal_flow::gateway::Gateway;
use proposal_flow::models::{
    ChatTurn, DocumentId, GeneratedContent, ProcessingStage, ProcessingStatus, Scope, TemplateId,
    Topic, TopicStatus,
};
use proposal_flow::poll::PollPolicy;
use proposal_flow::session::{DocumentSession, SessionOptions};

// ─── Scripted gateway ───────────────────────────────────────────────

#[derive(Default)]
pub struct Calls {
    pub status: AtomicUsize,
    pub extract: AtomicUsize,
    pub confirm: AtomicUsize,
    pub topics: AtomicUsize,
    pub content: AtomicUsize,
    pub chat: AtomicUsize,
    pub save: AtomicUsize,
}

fn count(c: &AtomicUsize) -> usize {
    c.load(Ordering::SeqCst)
}

/// In-memory stand-in for the remote service. Counts every call and can be
/// told to fail or to block generation until released.
pub struct FakeGateway {
    pub calls: Calls,
    statuses: Mutex<VecDeque<Result<ProcessingStatus, RemoteError>>>,
    idle_stage: ProcessingStage,
    scope: Scope,
    topics: Vec<Topic>,
    failing_topics: Mutex<HashSet<String>>,
    fail_chat: AtomicBool,
    fail_save: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    pub confirmed_pages: Mutex<Vec<Vec<u32>>>,
    pub chat_histories: Mutex<Vec<Vec<ChatTurn>>>,
    pub saved: Mutex<Vec<(i64, String)>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: Calls::default(),
            statuses: Mutex::new(VecDeque::new()),
            idle_stage: ProcessingStage::Processed,
            scope: Scope {
                text: "Supply and integration of the IPMS".to_string(),
                source_pages: vec![3, 4],
                confirmed: false,
                is_complete: true,
            },
            topics: default_topics(),
            failing_topics: Mutex::new(HashSet::new()),
            fail_chat: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
            gate: Mutex::new(None),
            confirmed_pages: Mutex::new(Vec::new()),
            chat_histories: Mutex::new(Vec::new()),
            saved: Mutex::new(Vec::new()),
        }
    }

    /// Status returned once the scripted queue is drained.
    pub fn with_idle_stage(mut self, stage: ProcessingStage) -> Self {
        self.idle_stage = stage;
        self
    }

    pub fn script_statuses(&self, items: Vec<Result<ProcessingStatus, RemoteError>>) {
        self.statuses.lock().unwrap().extend(items);
    }

    pub fn fail_topic(&self, text: &str) {
        self.failing_topics.lock().unwrap().insert(text.to_string());
    }

    pub fn set_fail_chat(&self, fail: bool) {
        self.fail_chat.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    /// Blocks content generation and chat until the returned handle is
    /// notified once per blocked call.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    pub fn status_calls(&self) -> usize {
        count(&self.calls.status)
    }
    pub fn extract_calls(&self) -> usize {
        count(&self.calls.extract)
    }
    pub fn confirm_calls(&self) -> usize {
        count(&self.calls.confirm)
    }
    pub fn topic_calls(&self) -> usize {
        count(&self.calls.topics)
    }
    pub fn content_calls(&self) -> usize {
        count(&self.calls.content)
    }
    pub fn chat_calls(&self) -> usize {
        count(&self.calls.chat)
    }
    pub fn save_calls(&self) -> usize {
        count(&self.calls.save)
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn get_status(&self, _document: &DocumentId) -> Result<ProcessingStatus, RemoteError> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ProcessingStatus::new(self.idle_stage, "")))
    }

    async fn extract_scope(
        &self,
        _document: &DocumentId,
        _use_cache: bool,
    ) -> Result<Scope, RemoteError> {
        self.calls.extract.fetch_add(1, Ordering::SeqCst);
        Ok(self.scope.clone())
    }

    async fn confirm_scope(
        &self,
        _document: &DocumentId,
        page_numbers: &[u32],
    ) -> Result<Scope, RemoteError> {
        self.calls.confirm.fetch_add(1, Ordering::SeqCst);
        self.confirmed_pages
            .lock()
            .unwrap()
            .push(page_numbers.to_vec());
        Ok(Scope {
            source_pages: page_numbers.to_vec(),
            confirmed: true,
            ..self.scope.clone()
        })
    }

    async fn generate_topics(
        &self,
        _document: &DocumentId,
        _template: &TemplateId,
    ) -> Result<Vec<Topic>, RemoteError> {
        self.calls.topics.fetch_add(1, Ordering::SeqCst);
        Ok(self.topics.clone())
    }

    async fn generate_content(
        &self,
        _document: &DocumentId,
        _template: &TemplateId,
        topic_text: &str,
        _context: Option<&str>,
    ) -> Result<GeneratedContent, RemoteError> {
        self.calls.content.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        if self.failing_topics.lock().unwrap().contains(topic_text) {
            return Err(RemoteError::http(500, "generation failed"));
        }
        Ok(GeneratedContent {
            topic: topic_text.to_string(),
            content: format!("Content for {}.", topic_text),
        })
    }

    async fn chat(
        &self,
        _document: &DocumentId,
        _template: &TemplateId,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, RemoteError> {
        self.calls.chat.fetch_add(1, Ordering::SeqCst);
        self.chat_histories.lock().unwrap().push(history.to_vec());
        self.wait_gate().await;
        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(RemoteError::network("connection reset"));
        }
        Ok(format!("Answer to: {}", message))
    }

    async fn save_content(
        &self,
        _document: &DocumentId,
        topic_id: i64,
        content: &str,
    ) -> Result<(), RemoteError> {
        self.calls.save.fetch_add(1, Ordering::SeqCst);
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(RemoteError::http(503, "unavailable"));
        }
        self.saved
            .lock()
            .unwrap()
            .push((topic_id, content.to_string()));
        Ok(())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

/// `Intro` (id 1), `Scope` (no id) and `Warranty` (marked for removal).
pub fn default_topics() -> Vec<Topic> {
    vec![
        Topic {
            id: Some(1),
            level: Some(1),
            ..Topic::new("Intro")
        },
        Topic {
            level: Some(1),
            ..Topic::new("Scope")
        },
        Topic {
            id: Some(3),
            level: Some(1),
            status: TopicStatus::Remove,
            ..Topic::new("Warranty")
        },
    ]
}

pub fn doc() -> DocumentId {
    DocumentId::new("doc1.pdf")
}

pub fn other_doc() -> DocumentId {
    DocumentId::new("doc2.pdf")
}

pub fn tpl() -> TemplateId {
    TemplateId::new("tplA")
}

pub fn processed() -> ProcessingStatus {
    ProcessingStatus::new(ProcessingStage::Processed, "done")
}

pub fn processing() -> ProcessingStatus {
    ProcessingStatus::new(ProcessingStage::Processing, "extracting text")
}

pub fn fast_options() -> SessionOptions {
    SessionOptions {
        poll: PollPolicy {
            interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            max_transport_failures: 3,
        },
        batch_pacing: Duration::ZERO,
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub cache: Arc<InMemoryCache>,
    pub engine: WorkflowEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeGateway::new(), Arc::new(InMemoryCache::new()))
    }

    pub fn with(gateway: FakeGateway, cache: Arc<InMemoryCache>) -> Self {
        let gateway = Arc::new(gateway);
        let engine = WorkflowEngine::new(
            gateway.clone(),
            cache.clone() as Arc<dyn ArtifactCache>,
        )
        .with_options(fast_options());
        Self {
            gateway,
            cache,
            engine,
        }
    }

    /// Selects `doc1.pdf` with `tplA` and marks it processed.
    pub async fn processed_session(&mut self) -> DocumentSession {
        let session = self
            .engine
            .select_document(doc(), Some(tpl()))
            .await
            .unwrap();
        session.apply_status(processed()).unwrap();
        session
    }

    /// Walks the happy path up to `TopicsReady`.
    pub async fn ready_session(&mut self) -> DocumentSession {
        let session = self.processed_session().await;
        session.extract_scope(true).await.unwrap();
        session.confirm_scope(None).await.unwrap();
        session.generate_topics(false).await.unwrap();
        session
    }
}

/// Lets spawned tasks run until `cond` holds.
pub async fn settle(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
