//! Testing utilities for casegen workspace
//!
//! Model and tracker doubles, plus fixtures shared by the integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use casegen_core::llm::prompts;
use casegen_core::{
    ExternalError, Issue, ModelClient, ModelError, ModelRequest, ModelResponse, PipelineConfig,
    Stage, TicketTracker,
};
use casegen_kernel::MemoryStore;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Ticket used across the end-to-end tests
pub const LOGIN_TICKET: &str = "TCG-1";

/// Replies queued per stage; an exhausted queue falls through to `fallback`
pub struct ScriptedModel {
    replies: Mutex<HashMap<Stage, VecDeque<Result<ModelResponse, ModelError>>>>,
    fallback: Box<dyn ModelClient>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// Script falling through to [`EchoModel`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_fallback(EchoModel)
    }

    #[must_use]
    pub fn with_fallback(fallback: impl ModelClient + 'static) -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            fallback: Box::new(fallback),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw text reply for `stage`
    #[must_use]
    pub fn reply(self, stage: Stage, content: impl Into<String>) -> Self {
        self.push(stage, Ok(ModelResponse::text(content)))
    }

    /// Queue a JSON reply for `stage`
    #[must_use]
    pub fn json(self, stage: Stage, value: Value) -> Self {
        self.reply(stage, value.to_string())
    }

    /// Queue a failure for `stage`
    #[must_use]
    pub fn fail(self, stage: Stage, error: ModelError) -> Self {
        self.push(stage, Err(error))
    }

    fn push(self, stage: Stage, reply: Result<ModelResponse, ModelError>) -> Self {
        self.replies.lock().entry(stage).or_default().push_back(reply);
        self
    }

    /// Calls seen for `stage`
    #[must_use]
    pub fn calls_to(&self, stage: Stage) -> usize {
        self.requests.lock().iter().filter(|r| r.stage == stage).count()
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn call(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().push(request.clone());
        let queued = self
            .replies
            .lock()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(reply) => reply,
            None => self.fallback.call(request).await,
        }
    }
}

/// Answers every stage with a well-formed reply built from the prompt's
/// input block
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoModel;

#[async_trait]
impl ModelClient for EchoModel {
    async fn call(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let input = prompts::input_of(&request.prompt).unwrap_or(Value::Null);
        Ok(ModelResponse::text(echo(request.stage, &input).to_string()).with_usage(100, 50))
    }
}

/// Always fails with the given error
#[derive(Debug, Clone)]
pub struct FailingModel(pub ModelError);

impl FailingModel {
    #[must_use]
    pub fn transport() -> Self {
        Self(ModelError::Transport("connection reset".into()))
    }
}

#[async_trait]
impl ModelClient for FailingModel {
    async fn call(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
        Err(self.0.clone())
    }
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn echo(stage: Stage, input: &Value) -> Value {
    match stage {
        Stage::IrExtraction => echo_claims(input),
        Stage::Analysis => echo_analysis(input),
        Stage::Coverage => echo_seeds(array(input, "items"), &["edge", "error", "permission"]),
        Stage::Backfill => {
            let missing: Vec<&str> = array(input, "missing_aspects").iter().filter_map(Value::as_str).collect();
            echo_seeds(array(input, "items"), &missing)
        }
        Stage::Testcase | Stage::Supplement => {
            json!({ "cases": array(input, "entries").iter().map(echo_case).collect::<Vec<_>>() })
        }
        Stage::Audit => json!({ "cases": array(input, "cases") }),
        Stage::QualityRepair => json!({
            "cases": array(input, "cases").iter().filter_map(|f| f.get("case")).collect::<Vec<_>>()
        }),
    }
}

fn echo_claims(input: &Value) -> Value {
    let mut flows = Vec::new();
    for chunk in array(input, "chunks") {
        for (i, sentence) in array(chunk, "sentences").iter().enumerate() {
            let Some(sentence) = sentence.as_str() else { continue };
            flows.push(json!({
                "text": sentence,
                "chunk_id": text(chunk, "id"),
                "sentence_ids": [i],
                "quote": sentence,
            }));
        }
    }
    json!({ "flows": flows })
}

fn echo_analysis(input: &Value) -> Value {
    let mut sections: Vec<(String, Vec<Value>)> = Vec::new();
    for claim in array(&input["ir"], "claims") {
        let name = capitalize(text(claim, "kind"));
        let statement = text(claim, "text").trim_end_matches('.');
        let item = json!({
            "title": statement,
            "details": [],
            "checks": [format!("Check that {statement}")],
            "expected": [format!("The system shows that {statement}")],
            "requirement_ids": [text(claim, "id")],
        });
        match sections.iter_mut().find(|(n, _)| *n == name) {
            Some((_, items)) => items.push(item),
            None => sections.push((name, vec![item])),
        }
    }
    json!({
        "sections": sections
            .into_iter()
            .map(|(name, items)| json!({ "name": name, "items": items }))
            .collect::<Vec<_>>()
    })
}

/// A happy seed per item; the first item also carries `extra` aspects
fn echo_seeds(items: &[Value], extra: &[&str]) -> Value {
    let mut seeds = Vec::new();
    for (n, item) in items.iter().enumerate() {
        let title = text(item, "title");
        let seed = |aspect: &str, suffix: &str, category: &str| {
            json!({
                "group": text(item, "section"),
                "title": format!("{title}{suffix}"),
                "aspect": aspect,
                "category": category,
                "state": "ok",
                "analysis_ids": [text(item, "id")],
                "checks": item.get("checks").cloned().unwrap_or(Value::Null),
                "expected": item.get("expected").cloned().unwrap_or(Value::Null),
                "hints": [],
            })
        };
        seeds.push(seed("happy", "", "happy"));
        if n == 0 {
            for aspect in extra {
                seeds.push(match *aspect {
                    "edge" => seed("edge", " at the limit", "boundary"),
                    "error" => seed("error", " rejects invalid input", "negative"),
                    "permission" => seed("permission", " denied without access", "negative"),
                    _ => continue,
                });
            }
        }
    }
    json!({ "seeds": seeds })
}

fn echo_case(entry: &Value) -> Value {
    let title = text(entry, "title");
    json!({
        "id": text(entry, "id"),
        "title": title,
        "preconditions": ["A registered user account exists"],
        "steps": [
            format!("Open the {} page", text(entry, "section")),
            format!("Perform the scenario: {title}"),
            "Submit the form",
        ],
        "expected": format!("The system shows the outcome of '{title}'"),
        "priority": if text(entry, "category") == "happy" { "high" } else { "medium" },
    })
}

/// Tracker over a fixed set of issues
#[derive(Debug, Default)]
pub struct StaticTracker {
    issues: HashMap<String, Issue>,
    related: Vec<Issue>,
    searches: Mutex<usize>,
}

impl StaticTracker {
    #[must_use]
    pub fn new(issues: impl IntoIterator<Item = Issue>) -> Self {
        Self {
            issues: issues.into_iter().map(|i| (i.key.clone(), i)).collect(),
            ..Self::default()
        }
    }

    /// Issues returned by every search
    #[must_use]
    pub fn with_related(mut self, related: impl IntoIterator<Item = Issue>) -> Self {
        self.related = related.into_iter().collect();
        self
    }

    #[must_use]
    pub fn searches(&self) -> usize {
        *self.searches.lock()
    }
}

#[async_trait]
impl TicketTracker for StaticTracker {
    async fn get_issue(&self, key: &str, _fields: &[&str]) -> Result<Issue, ExternalError> {
        self.issues
            .get(key)
            .cloned()
            .ok_or_else(|| ExternalError::NotFound(key.to_string()))
    }

    async fn search_issues(&self, _query: &str, _fields: &[&str], limit: usize) -> Result<Vec<Issue>, ExternalError> {
        *self.searches.lock() += 1;
        Ok(self.related.iter().take(limit).cloned().collect())
    }
}

/// TCG-1: email and OTP login
#[must_use]
pub fn login_issue() -> Issue {
    Issue::new(LOGIN_TICKET)
        .with_field("summary", json!("Login with email OTP"))
        .with_field(
            "description",
            json!("User logs in with email and OTP. OTP expires after 5 minutes."),
        )
        .with_field("issuetype", json!({ "name": "Story" }))
}

/// Pipeline config with immediate retries
#[must_use]
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::new();
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config
}

/// Store shared as both session and case store
#[must_use]
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
