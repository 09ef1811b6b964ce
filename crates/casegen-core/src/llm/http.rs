//! OpenAI-style chat completions client

use crate::llm::{ModelClient, ModelError, ModelRequest, ModelResponse, Usage};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// [`ModelClient`] over `POST {base_url}/chat/completions`
///
/// Strict mode is `response_format: {"type": "json_object"}`. A 400 that
/// mentions `response_format` maps to [`ModelError::StrictJsonUnsupported`].
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    strict_json: bool,
}

impl HttpModelClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            strict_json: true,
        }
    }

    /// Builder: bearer token
    #[inline]
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder: whether to request strict JSON mode at all
    #[inline]
    #[must_use]
    pub fn with_strict_json(mut self, enabled: bool) -> Self {
        self.strict_json = enabled;
        self
    }

    fn body(request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": request.settings.model,
            "temperature": request.settings.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if request.strict_json {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    fn cost(request: &ModelRequest, usage: Usage) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let (prompt, completion) = (usage.prompt_tokens as f64, usage.completion_tokens as f64);
        prompt / 1000.0 * request.settings.prompt_cost_per_1k
            + completion / 1000.0 * request.settings.completion_cost_per_1k
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn supports_strict_json(&self) -> bool {
        self.strict_json
    }

    async fn call(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(request.settings.timeout_secs))
            .json(&Self::body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => ModelError::RateLimited(text),
                400 if request.strict_json && text.contains("response_format") => {
                    ModelError::StrictJsonUnsupported(text)
                }
                500..=599 | 408 => ModelError::Transport(format!("{status}: {text}")),
                _ => ModelError::Rejected(format!("{status}: {text}")),
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(format!("invalid completion body: {e}")))?;
        let usage = completion.usage.map_or_else(Usage::default, |u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let (content, finish_reason) = completion
            .choices
            .into_iter()
            .next()
            .map(|c| (c.message.and_then(|m| m.content).unwrap_or_default(), c.finish_reason))
            .unwrap_or_default();

        tracing::debug!(stage = %request.stage, tokens = usage.total(), ?finish_reason, "model call");
        Ok(ModelResponse {
            content,
            cost: Self::cost(&request, usage),
            usage,
            finish_reason,
            id: completion.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageModelConfig;
    use crate::llm::Stage;

    fn request(strict: bool) -> ModelRequest {
        ModelRequest {
            stage: Stage::Analysis,
            prompt: "hi".into(),
            strict_json: strict,
            settings: StageModelConfig {
                prompt_cost_per_1k: 1.0,
                completion_cost_per_1k: 2.0,
                ..StageModelConfig::default()
            },
        }
    }

    #[test]
    fn strict_mode_sets_response_format() {
        assert_eq!(
            HttpModelClient::body(&request(true))["response_format"]["type"],
            "json_object"
        );
        assert!(HttpModelClient::body(&request(false)).get("response_format").is_none());
    }

    #[test]
    fn cost_uses_stage_rates() {
        let usage = Usage {
            prompt_tokens: 1000,
            completion_tokens: 500,
        };
        assert!((HttpModelClient::cost(&request(true), usage) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn base_url_is_normalized() {
        let client = HttpModelClient::new("http://localhost:8080/v1/").with_strict_json(false);
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert!(!client.supports_strict_json());
    }
}
