//! Stage-call ladder
//!
//! One contract call is an ordered list of attempts:
//!
//! 1. `Initial` - the stage prompt, strict JSON mode if the client supports it
//! 2. `Regenerate` - the same prompt again, after an empty, truncated or
//!    unparseable reply
//! 3. `Repair` - a syntax-repair prompt over the last non-empty broken reply
//!
//! Each attempt yields a parsed value or an [`AttemptFailure`] that picks the
//! next prompt. A provider rejecting strict mode is retried at once without
//! it, and strict mode stays off for the rest of the ladder. Transport
//! failures are retried underneath by [`RetryPolicy`] and end the ladder
//! when exhausted.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{prompts, ModelClient, ModelError, ModelRequest, ModelResponse, RetryPolicy, Stage, Usage};
use crate::report::FallbackEvent;
use casegen_contract::{ContractError, ContractParser, ParsedContract};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position in the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Initial,
    Regenerate,
    Repair,
}

impl AttemptKind {
    /// Ladder order
    pub const LADDER: [AttemptKind; 3] = [Self::Initial, Self::Regenerate, Self::Repair];
}

/// Why an attempt produced no value
#[derive(Debug)]
enum AttemptFailure {
    Empty,
    Truncated { content: String },
    Unparseable { content: String, error: ContractError },
}

impl AttemptFailure {
    fn content(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Truncated { content } | Self::Unparseable { content, .. } => Some(content),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Truncated { .. } => "truncated",
            Self::Unparseable { .. } => "unparseable",
        }
    }
}

/// What happened during one contract call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTrace {
    pub stage: Stage,
    pub attempts: Vec<AttemptKind>,
    pub strict_retracted: bool,
    pub empty_substituted: bool,
    /// Candidate kind and repairs when the local parser had to recover
    pub recovered: Option<(String, String)>,
    pub finish_reasons: Vec<Option<String>>,
    pub calls: usize,
    pub usage: Usage,
    pub cost: f64,
}

impl CallTrace {
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempts: Vec::new(),
            strict_retracted: false,
            empty_substituted: false,
            recovered: None,
            finish_reasons: Vec::new(),
            calls: 0,
            usage: Usage::default(),
            cost: 0.0,
        }
    }

    fn record(&mut self, response: &ModelResponse) {
        self.calls += 1;
        self.usage += response.usage;
        self.cost += response.cost;
        self.finish_reasons.push(response.finish_reason.clone());
    }

    /// Fallback events implied by this trace
    #[must_use]
    pub fn events(&self) -> Vec<FallbackEvent> {
        let stage = self.stage;
        let mut events = Vec::new();
        if self.strict_retracted {
            events.push(FallbackEvent::StrictJsonRetracted { stage });
        }
        for attempt in &self.attempts {
            match attempt {
                AttemptKind::Initial => {}
                AttemptKind::Regenerate => events.push(FallbackEvent::Regenerated { stage }),
                AttemptKind::Repair => events.push(FallbackEvent::SyntaxRepaired { stage }),
            }
        }
        if let Some((candidate, repairs)) = &self.recovered {
            events.push(FallbackEvent::ContractRecovered {
                stage,
                candidate: candidate.clone(),
                repairs: repairs.clone(),
            });
        }
        if self.empty_substituted {
            events.push(FallbackEvent::EmptyPayloadSubstituted { stage });
        }
        events
    }
}

/// Parsed reply plus its trace
#[derive(Debug, Clone)]
pub struct ContractReply {
    pub value: Value,
    pub trace: CallTrace,
}

/// Runs the ladder for one stage prompt
pub struct ContractCaller<'a> {
    client: &'a dyn ModelClient,
    config: &'a PipelineConfig,
    retry: RetryPolicy,
    parser: ContractParser,
}

impl std::fmt::Debug for ContractCaller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractCaller")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<'a> ContractCaller<'a> {
    #[must_use]
    pub fn new(client: &'a dyn ModelClient, config: &'a PipelineConfig) -> Self {
        Self {
            client,
            config,
            retry: RetryPolicy::from_config(&config.retry),
            parser: ContractParser::new(),
        }
    }

    /// Builder: override the retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the ladder.
    ///
    /// `empty_payload` is substituted when the reply stays empty through
    /// the whole ladder and substitution is enabled.
    ///
    /// # Errors
    /// [`PipelineError::Transport`] when retries are exhausted or the
    /// provider rejects the call; [`PipelineError::Parse`] when no attempt
    /// yields JSON.
    pub async fn call_json(
        &self,
        stage: Stage,
        prompt: &str,
        empty_payload: Option<Value>,
    ) -> PipelineResult<ContractReply> {
        let mut trace = CallTrace::new(stage);
        let mut strict = self.client.supports_strict_json();
        let mut failure: Option<AttemptFailure> = None;
        let mut broken: Option<String> = None;

        for kind in AttemptKind::LADDER {
            let text = match (kind, broken.as_deref()) {
                (AttemptKind::Initial, _) => prompt.to_string(),
                (AttemptKind::Repair, Some(broken)) => prompts::repair_syntax(stage, broken),
                (AttemptKind::Regenerate | AttemptKind::Repair, _) => prompts::regenerate(stage, prompt),
            };
            trace.attempts.push(kind);

            let response = self.send(stage, text, &mut strict, &mut trace).await?;
            match self.evaluate(&response) {
                Ok(parsed) => {
                    tracing::debug!(%stage, attempt = ?kind, calls = trace.calls, "contract call succeeded");
                    if !parsed.is_clean() {
                        trace.recovered = Some((format!("{:?}", parsed.candidate), parsed.repairs.to_string()));
                    }
                    return Ok(ContractReply {
                        value: parsed.value,
                        trace,
                    });
                }
                Err(f) => {
                    tracing::warn!(%stage, attempt = ?kind, failure = f.label(), "contract attempt failed");
                    if let Some(content) = f.content() {
                        broken = Some(content.to_string());
                    }
                    failure = Some(f);
                }
            }
        }

        match failure {
            Some(AttemptFailure::Empty) => match empty_payload {
                Some(value) if self.config.substitute_empty_payload => {
                    tracing::warn!(%stage, "empty reply after full ladder, substituting empty payload");
                    trace.empty_substituted = true;
                    Ok(ContractReply { value, trace })
                }
                _ => Err(PipelineError::parse(stage.as_str(), ContractError::Empty)),
            },
            Some(AttemptFailure::Unparseable { error, .. }) => Err(PipelineError::parse(stage.as_str(), error)),
            Some(AttemptFailure::Truncated { content }) => Err(PipelineError::parse(
                stage.as_str(),
                ContractError::Unparseable {
                    attempts: trace.attempts.len(),
                    last_error: "reply truncated by token limit".to_string(),
                    excerpt: content.chars().take(80).collect(),
                },
            )),
            None => Err(PipelineError::parse(stage.as_str(), ContractError::Empty)),
        }
    }

    async fn send(
        &self,
        stage: Stage,
        prompt: String,
        strict: &mut bool,
        trace: &mut CallTrace,
    ) -> PipelineResult<ModelResponse> {
        loop {
            let request = ModelRequest {
                stage,
                prompt: prompt.clone(),
                strict_json: *strict,
                settings: self.config.stage(stage).clone(),
            };
            let result = self
                .retry
                .run(stage.as_str(), || self.client.call(request.clone()))
                .await;
            match result {
                Ok(response) => {
                    trace.record(&response);
                    return Ok(response);
                }
                Err(ModelError::StrictJsonUnsupported(msg)) if *strict => {
                    tracing::warn!(%stage, reason = %msg, "strict JSON rejected, retrying without it");
                    *strict = false;
                    trace.strict_retracted = true;
                }
                Err(err) => return Err(PipelineError::transport(stage.as_str(), err)),
            }
        }
    }

    fn evaluate(&self, response: &ModelResponse) -> Result<ParsedContract, AttemptFailure> {
        let content = response.content.trim();
        if content.is_empty() {
            return Err(AttemptFailure::Empty);
        }
        if response.is_truncated() {
            return Err(AttemptFailure::Truncated {
                content: content.to_string(),
            });
        }
        self.parser
            .parse(content)
            .map_err(|error| AttemptFailure::Unparseable {
                content: content.to_string(),
                error,
            })
    }
}
