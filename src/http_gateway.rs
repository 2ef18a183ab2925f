//! HTTP implementation of the [`Gateway`] trait.
//!
//! Talks to the document-analysis service's REST API under
//! `{base_url}{api_path}`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | status | `GET /documents/{doc}/status` |
//! | extract scope | `GET /documents/{doc}/scope?use_cache=…` |
//! | confirm scope | `POST /documents/{doc}/confirm-scope` |
//! | topics | `POST /analysis/generate-topics/{doc}/{tpl}` |
//! | content | `POST /analysis/generate-content/{doc}/{tpl}` |
//! | chat | `POST /analysis/chat/{doc}/{tpl}` |
//! | save | `PUT /documents/{doc}/content/{topic_id}` |
//!
//! # Error Mapping
//!
//! - non-2xx → `http_<status>` with the service's `detail` message when present
//! - client timeout → `timeout`
//! - other transport failures → `network`
//! - unparseable body → `decode`
//!
//! No request is retried here. Generation calls are billed remotely and
//! the engine decides whether an operation is re-issued.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use proposal_flow_core::error::RemoteError;
use proposal_flow_core::gateway::Gateway;
use proposal_flow_core::models::{
    ChatRole, ChatTurn, DocumentId, GeneratedContent, ProcessingStage, ProcessingStatus, Scope,
    TemplateId, Topic,
};

use crate::config::ServiceConfig;

/// [`Gateway`] over the service's JSON API.
pub struct HttpGateway {
    client: Client,
    root: String,
}

impl HttpGateway {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let root = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.api_path.trim_end_matches('/')
        );
        Ok(Self { client, root })
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.root.clone();
        for s in segments {
            url.push('/');
            url.push_str(&encode_segment(s));
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "service returned an error");
            return Err(RemoteError::http(status.as_u16(), error_detail(&body_text)));
        }

        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::new("decode", format!("unexpected response body: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::new("timeout", e.to_string())
    } else {
        RemoteError::network(e.to_string())
    }
}

/// Extracts FastAPI's `{"detail": "..."}` when present.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Percent-encodes one path segment (filenames and template names may
/// contain spaces).
fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

// ============ Wire types ============

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    pages: Option<u32>,
}

impl From<StatusResponse> for ProcessingStatus {
    fn from(r: StatusResponse) -> Self {
        ProcessingStatus {
            stage: ProcessingStage::from_wire(&r.status),
            message: r.message,
            progress: r.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            pages: r.pages.filter(|p| *p > 0),
        }
    }
}

/// Page numbers arrive as integers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePage {
    Number(u32),
    Text(String),
}

#[derive(Deserialize)]
struct ScopeResponse {
    #[serde(default)]
    scope_text: String,
    #[serde(default)]
    source_pages: Vec<WirePage>,
    #[serde(default)]
    is_complete: bool,
}

impl ScopeResponse {
    fn into_scope(self, confirmed: bool) -> Scope {
        let source_pages = self
            .source_pages
            .into_iter()
            .filter_map(|p| match p {
                WirePage::Number(n) => Some(n),
                WirePage::Text(s) => s.trim().parse().ok(),
            })
            .collect();
        Scope {
            text: self.scope_text,
            source_pages,
            confirmed,
            is_complete: self.is_complete,
        }
    }
}

#[derive(Serialize)]
struct ConfirmScopeRequest<'a> {
    page_numbers: &'a [u32],
}

#[derive(Deserialize)]
struct ConfirmScopeResponse {
    scope: ScopeResponse,
}

#[derive(Deserialize)]
struct TopicsResponse {
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Serialize)]
struct ContentRequest<'a> {
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
    #[serde(default)]
    topic: String,
}

/// The service's history format: `{"user": "..."}` or `{"agent": "..."}`.
#[derive(Serialize)]
struct WireTurn<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<&'a str>,
}

impl<'a> From<&'a ChatTurn> for WireTurn<'a> {
    fn from(t: &'a ChatTurn) -> Self {
        match t.role {
            ChatRole::User => WireTurn {
                user: Some(&t.content),
                agent: None,
            },
            ChatRole::Assistant => WireTurn {
                user: None,
                agent: Some(&t.content),
            },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    history: Vec<WireTurn<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Serialize)]
struct SaveContentRequest<'a> {
    content: &'a str,
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn get_status(&self, document: &DocumentId) -> Result<ProcessingStatus, RemoteError> {
        let url = self.url(&["documents", document.as_str(), "status"]);
        debug!(%url, "status");
        let r: StatusResponse = self.send(self.client.get(&url)).await?;
        Ok(r.into())
    }

    async fn extract_scope(
        &self,
        document: &DocumentId,
        use_cache: bool,
    ) -> Result<Scope, RemoteError> {
        let url = self.url(&["documents", document.as_str(), "scope"]);
        let r: ScopeResponse = self
            .send(
                self.client
                    .get(&url)
                    .query(&[("use_cache", if use_cache { "true" } else { "false" })]),
            )
            .await?;
        Ok(r.into_scope(false))
    }

    async fn confirm_scope(
        &self,
        document: &DocumentId,
        page_numbers: &[u32],
    ) -> Result<Scope, RemoteError> {
        let url = self.url(&["documents", document.as_str(), "confirm-scope"]);
        let r: ConfirmScopeResponse = self
            .send(
                self.client
                    .post(&url)
                    .json(&ConfirmScopeRequest { page_numbers }),
            )
            .await?;
        Ok(r.scope.into_scope(true))
    }

    async fn generate_topics(
        &self,
        document: &DocumentId,
        template: &TemplateId,
    ) -> Result<Vec<Topic>, RemoteError> {
        let url = self.url(&[
            "analysis",
            "generate-topics",
            document.as_str(),
            template.as_str(),
        ]);
        let r: TopicsResponse = self.send(self.client.post(&url)).await?;
        if r.topics.is_empty() {
            return Err(RemoteError::new(
                "empty",
                "service returned no topics; check the scope and template",
            ));
        }
        Ok(r.topics)
    }

    async fn generate_content(
        &self,
        document: &DocumentId,
        template: &TemplateId,
        topic_text: &str,
        context: Option<&str>,
    ) -> Result<GeneratedContent, RemoteError> {
        let url = self.url(&[
            "analysis",
            "generate-content",
            document.as_str(),
            template.as_str(),
        ]);
        let r: ContentResponse = self
            .send(self.client.post(&url).json(&ContentRequest {
                topic: topic_text,
                context,
            }))
            .await?;
        let topic = if r.topic.is_empty() {
            topic_text.to_string()
        } else {
            r.topic
        };
        Ok(GeneratedContent {
            topic,
            content: r.content,
        })
    }

    async fn chat(
        &self,
        document: &DocumentId,
        template: &TemplateId,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, RemoteError> {
        let url = self.url(&["analysis", "chat", document.as_str(), template.as_str()]);
        let body = ChatRequest {
            message,
            history: history.iter().map(WireTurn::from).collect(),
        };
        let r: ChatResponse = self.send(self.client.post(&url).json(&body)).await?;
        if r.status.as_deref() == Some("error") {
            return Err(RemoteError::new("agent", r.response));
        }
        Ok(r.response)
    }

    async fn save_content(
        &self,
        document: &DocumentId,
        topic_id: i64,
        content: &str,
    ) -> Result<(), RemoteError> {
        let id = topic_id.to_string();
        let url = self.url(&["documents", document.as_str(), "content", &id]);
        let _ack: serde_json::Value = self
            .send(self.client.put(&url).json(&SaveContentRequest { content }))
            .await?;
        Ok(())
    }
}
