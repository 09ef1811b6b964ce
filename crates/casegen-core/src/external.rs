//! External collaborators
//!
//! The ticket tracker, vector search and embedder are injected as trait
//! objects. [`ContextSearch`] wraps the vector side: lookups are bounded by a
//! semaphore and never fail the pipeline.

use crate::config::ContextConfig;
use crate::llm::Retryable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Tracker or vector-store failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl Retryable for ExternalError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A tracker issue as a bag of fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub fields: Map<String, Value>,
}

impl Issue {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Map::new(),
        }
    }

    /// Builder: set a field
    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Field as plain text; rich-text documents are flattened
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).map(plain_text).unwrap_or_default()
    }
}

/// Flatten a string or rich-text JSON document into plain text
///
/// Rich text is any nesting of objects with `text` leaves and `content`
/// arrays; block nodes are separated by newlines.
#[must_use]
pub fn plain_text(value: &Value) -> String {
    let mut out = String::new();
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        match node {
            Value::String(s) => push_block(&mut out, s),
            Value::Object(obj) => {
                if let Some(Value::String(text)) = obj.get("text") {
                    out.push_str(text);
                }
                if let Some(Value::Array(children)) = obj.get("content") {
                    if obj.get("type").and_then(Value::as_str) != Some("text") && !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    stack.extend(children.iter().rev());
                }
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn push_block(out: &mut String, text: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(text);
}

/// Ticket tracker
#[async_trait]
pub trait TicketTracker: Send + Sync {
    async fn get_issue(&self, key: &str, fields: &[&str]) -> Result<Issue, ExternalError>;

    async fn search_issues(
        &self,
        query: &str,
        fields: &[&str],
        limit: usize,
    ) -> Result<Vec<Issue>, ExternalError>;
}

/// One vector-search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

impl VectorHit {
    /// Snippet text carried in the payload
    #[must_use]
    pub fn snippet(&self) -> String {
        match self.payload.get("text") {
            Some(Value::String(s)) => s.clone(),
            _ => self.payload.to_string(),
        }
    }
}

/// Vector store
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, ExternalError>;
}

/// Text embedder
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError>;
}

/// Related-snippet lookup with bounded concurrency
#[derive(Clone)]
pub struct ContextSearch {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn VectorSearch>,
    limiter: Arc<Semaphore>,
    collection: String,
    limit: usize,
}

impl std::fmt::Debug for ContextSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSearch")
            .field("collection", &self.collection)
            .field("limit", &self.limit)
            .field("available_permits", &self.limiter.available_permits())
            .finish_non_exhaustive()
    }
}

impl ContextSearch {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, search: Arc<dyn VectorSearch>, config: &ContextConfig) -> Self {
        Self {
            embedder,
            search,
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            collection: config.collection.clone(),
            limit: config.limit,
        }
    }

    /// Related snippets for `text`; empty on any failure
    pub async fn related(&self, text: &str) -> Vec<String> {
        let Ok(_permit) = self.limiter.acquire().await else {
            return Vec::new();
        };
        let vector = match self.embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, continuing without context");
                return Vec::new();
            }
        };
        match self.search.query(&self.collection, &vector, self.limit).await {
            Ok(hits) => hits.iter().map(VectorHit::snippet).collect(),
            Err(e) => {
                tracing::warn!(error = %e, collection = %self.collection, "vector search failed");
                Vec::new()
            }
        }
    }
}
