//! Model access
//!
//! - [`ModelClient`]: the injected chat-model handle
//! - [`retry`]: exponential backoff below the contract ladder
//! - [`contract_call`]: the strict → regenerate → repair ladder
//! - [`http`]: OpenAI-style chat completions over `reqwest`
//! - [`prompts`]: prompt assembly

pub mod contract_call;
pub mod http;
pub mod prompts;
pub mod retry;

use crate::config::StageModelConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use contract_call::{AttemptKind, CallTrace, ContractCaller, ContractReply};
pub use http::HttpModelClient;
pub use retry::{Retryable, RetryPolicy};

/// Pipeline stage issuing a model call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IrExtraction,
    Analysis,
    Coverage,
    Backfill,
    Testcase,
    Supplement,
    Audit,
    QualityRepair,
}

impl Stage {
    /// Stable name, also the `[models.<name>]` config key
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::IrExtraction => "ir_extraction",
            Stage::Analysis => "analysis",
            Stage::Coverage => "coverage",
            Stage::Backfill => "backfill",
            Stage::Testcase => "testcase",
            Stage::Supplement => "supplement",
            Stage::Audit => "audit",
            Stage::QualityRepair => "quality_repair",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

/// One model call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub stage: Stage,
    pub prompt: String,
    /// Ask the provider to guarantee a JSON object body
    pub strict_json: bool,
    pub settings: StageModelConfig,
}

/// Model reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub usage: Usage,
    pub cost: f64,
    pub finish_reason: Option<String>,
    /// Provider response id
    pub id: Option<String>,
}

impl ModelResponse {
    /// Plain reply with `content`
    #[inline]
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some("stop".to_string()),
            ..Self::default()
        }
    }

    /// Builder: set finish reason
    #[inline]
    #[must_use]
    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// Builder: set usage
    #[inline]
    #[must_use]
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Usage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    /// Output was cut off by the token limit
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self.finish_reason.as_deref(), Some("length" | "max_tokens"))
    }
}

/// Model call failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Network or server failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Provider throttled the call
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider does not accept strict JSON mode
    #[error("strict JSON mode unsupported: {0}")]
    StrictJsonUnsupported(String),

    /// Request rejected for any other reason
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl Retryable for ModelError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited(_))
    }
}

/// Chat-model handle injected into the pipeline
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Whether strict JSON mode is worth asking for
    fn supports_strict_json(&self) -> bool {
        true
    }

    /// Issue one call
    async fn call(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
