//! Pipeline configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Sections:
//! - `[models]` per-stage model settings, falling back to `[models.default]`
//! - `[retry]` outbound call backoff
//! - `[ir]`, `[coverage]`, `[testcase]`, `[quality]` stage behavior
//! - `[numbering]` stage-1 id layout
//! - `[keywords]` category heuristics and deterministic IR vocabulary
//! - `[commit]` default category
//! - `[context]` related-context lookups

use crate::error::{PipelineError, PipelineResult};
use crate::llm::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Model settings for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageModelConfig {
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Cost per 1k prompt tokens, used for stage reports
    pub prompt_cost_per_1k: f64,
    /// Cost per 1k completion tokens
    pub completion_cost_per_1k: f64,
}

impl Default for StageModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
            prompt_cost_per_1k: 0.0,
            completion_cost_per_1k: 0.0,
        }
    }
}

/// Per-stage model table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Used for stages without their own entry
    pub default: StageModelConfig,
    /// Keyed by stage name (`analysis`, `testcase`, ...)
    #[serde(flatten)]
    pub stages: BTreeMap<String, StageModelConfig>,
}

/// Exponential backoff for outbound calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Requirement IR behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrConfig {
    /// Use the model for claim extraction; deterministic IR otherwise
    pub llm_extraction: bool,
    /// Tracker field holding acceptance criteria
    pub acceptance_criteria_field: String,
}

impl Default for IrConfig {
    fn default() -> Self {
        Self {
            llm_extraction: true,
            acceptance_criteria_field: "acceptance_criteria".to_string(),
        }
    }
}

/// Coverage completeness and backfill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Backfill rounds before giving up or synthesizing
    pub backfill_max_rounds: usize,
    /// Analysis items per backfill call
    pub backfill_batch_size: usize,
    /// Close remaining gaps deterministically instead of failing
    pub deterministic_backfill: bool,
    /// Build analysis items from the IR when the analysis call yields none
    pub analysis_fallback: bool,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            backfill_max_rounds: 2,
            backfill_batch_size: 8,
            deterministic_backfill: true,
            analysis_fallback: true,
        }
    }
}

/// Testcase generation behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestcaseConfig {
    /// Replace a failed section with its baseline cases instead of failing
    pub force_complete: bool,
    /// Run the audit pass after generation
    pub audit: bool,
}

impl Default for TestcaseConfig {
    fn default() -> Self {
        Self {
            force_complete: true,
            audit: true,
        }
    }
}

/// Quality gate thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_preconditions: usize,
    pub min_steps: usize,
    /// Step floor for API-style cases
    pub api_min_steps: usize,
    /// LLM repair rounds before deterministic repair
    pub max_repair_rounds: usize,
    /// Regexes no case text may match
    pub forbidden_patterns: Vec<String>,
    /// An expected line must contain one of these (case-insensitive)
    pub observability_keywords: Vec<String>,
    /// Titles containing one of these are API-style
    pub api_title_keywords: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_preconditions: 1,
            min_steps: 3,
            api_min_steps: 2,
            max_repair_rounds: 1,
            forbidden_patterns: strings(&[
                r"(?i)\bTBD\b",
                r"(?i)\bN/A\b",
                r"(?i)\bTODO\b",
                r"\?\?\?",
                r"(?i)<\s*placeholder\s*>",
                r"(?i)\blorem ipsum\b",
            ]),
            observability_keywords: strings(&[
                "display", "show", "shown", "see", "visible", "appear", "return", "receive",
                "redirect", "navigate", "message", "notif", "log", "record", "status",
                "response", "sent", "remain", "contain", "list", "present", "error",
                "prompt", "highlight",
            ]),
            api_title_keywords: strings(&["api", "endpoint", "http", "webhook", "rest"]),
        }
    }
}

/// Stage-1 numbering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingConfig {
    pub base: u32,
    pub step: u32,
    pub width: usize,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            base: 10,
            step: 10,
            width: 3,
        }
    }
}

/// Keyword vocabularies
///
/// Matching is case-insensitive over whole words, so inflections are listed
/// explicitly. A trailing `*` makes a keyword match every word it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Evidence that a seed exercises a failure path
    pub negative: Vec<String>,
    /// Evidence that a seed exercises a limit
    pub boundary: Vec<String>,
    /// Evidence for permission-aspect projection
    pub permission: Vec<String>,
    /// Deterministic IR: actor nouns
    pub actors: Vec<String>,
    /// Deterministic IR: rule modals
    pub rules: Vec<String>,
    /// Deterministic IR: non-functional markers
    pub non_functional: Vec<String>,
    /// Deterministic IR: out-of-scope phrases
    pub out_of_scope: Vec<String>,
    /// Deterministic IR: vague wording
    pub vague: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            negative: strings(&[
                "invalid", "error", "errors", "fail", "fails", "failed", "failure", "reject",
                "rejects", "rejected", "denied", "deny", "denies", "unauthori*", "forbidden",
                "expire", "expires", "expired", "expiry", "wrong", "incorrect", "not allowed",
                "cannot", "can't", "missing", "locked", "lockout", "timeout", "timed out",
                "duplicate", "duplicated", "unavailable",
            ]),
            boundary: strings(&[
                "maximum", "minimum", "max", "min", "limit", "limits", "boundary", "exceed",
                "exceeds", "exceeded", "at least", "at most", "length", "character",
                "characters", "empty", "zero", "overflow", "range", "threshold", "up to",
            ]),
            permission: strings(&[
                "permission", "permissions", "role", "roles", "admin", "admins", "unauthori*",
                "access", "privilege", "privileges", "forbidden", "owner", "login", "log in",
                "sign in", "authenticat*",
            ]),
            actors: strings(&[
                "user", "users", "admin", "admins", "administrator", "administrators",
                "customer", "customers", "operator", "operators", "manager", "managers", "guest",
                "guests", "system", "reviewer", "reviewers", "agent", "agents", "member",
                "members",
            ]),
            rules: strings(&[
                "must", "shall", "should", "only", "cannot", "can not", "not allowed",
                "required", "requires", "expire", "expires", "expired", "within", "at least",
                "at most", "maximum", "minimum", "limit", "never", "always",
            ]),
            non_functional: strings(&[
                "performance", "latency", "response time", "second", "seconds", "throughput",
                "availability", "secure", "security", "encrypt*", "accessib*", "scalab*",
                "audit*",
            ]),
            out_of_scope: strings(&[
                "out of scope", "not in scope", "not included", "excluded", "won't", "will not",
            ]),
            vague: strings(&[
                "etc", "appropriate", "as needed", "user-friendly", "user friendly", "fast",
                "some", "various", "tbd", "and so on",
            ]),
        }
    }
}

/// Commit behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Shared category for cases whose section path cannot be created
    pub default_category: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            default_category: "Uncategorized".to_string(),
        }
    }
}

/// Related-context lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Vector collection queried for related snippets
    pub collection: String,
    /// Snippets per lookup
    pub limit: usize,
    /// Concurrent vector lookups
    pub max_concurrency: usize,
    /// Linked issues folded into the requirement as link chunks
    pub related_issue_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            collection: "requirements".to_string(),
            limit: 5,
            max_concurrency: 4,
            related_issue_limit: 5,
        }
    }
}

/// Root pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub models: ModelsConfig,
    pub retry: RetryConfig,
    pub ir: IrConfig,
    pub coverage: CoverageConfig,
    pub testcase: TestcaseConfig,
    pub quality: QualityConfig,
    pub numbering: NumberingConfig,
    pub keywords: KeywordConfig,
    pub commit: CommitConfig,
    pub context: ContextConfig,
    /// Substitute an empty-but-valid payload when a stage stays empty
    pub substitute_empty_payload: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            retry: RetryConfig::default(),
            ir: IrConfig::default(),
            coverage: CoverageConfig::default(),
            testcase: TestcaseConfig::default(),
            quality: QualityConfig::default(),
            numbering: NumberingConfig::default(),
            keywords: KeywordConfig::default(),
            commit: CommitConfig::default(),
            context: ContextConfig::default(),
            substitute_empty_payload: true,
        }
    }
}

impl PipelineConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document and validate it
    ///
    /// # Errors
    /// Malformed TOML or values rejected by [`PipelineConfig::validate`].
    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// I/O failures plus everything [`PipelineConfig::from_toml_str`] rejects.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Settings for one stage
    #[must_use]
    pub fn stage(&self, stage: Stage) -> &StageModelConfig {
        self.models
            .stages
            .get(stage.as_str())
            .unwrap_or(&self.models.default)
    }

    /// Reject values that would make a stage unable to run
    ///
    /// # Errors
    /// [`PipelineError::Config`] naming the first offending field.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be >= 1".into()));
        }
        if self.coverage.backfill_batch_size == 0 {
            return Err(PipelineError::Config(
                "coverage.backfill_batch_size must be >= 1".into(),
            ));
        }
        if self.numbering.step == 0 {
            return Err(PipelineError::Config("numbering.step must be >= 1".into()));
        }
        if self.numbering.width == 0 {
            return Err(PipelineError::Config("numbering.width must be >= 1".into()));
        }
        if self.numbering.base.to_string().len() > self.numbering.width {
            return Err(PipelineError::Config(format!(
                "numbering.base {} does not fit in {} digits",
                self.numbering.base, self.numbering.width
            )));
        }
        if self.quality.min_steps == 0 || self.quality.api_min_steps == 0 {
            return Err(PipelineError::Config("quality step floors must be >= 1".into()));
        }
        if self.quality.api_min_steps > self.quality.min_steps {
            return Err(PipelineError::Config(
                "quality.api_min_steps must not exceed quality.min_steps".into(),
            ));
        }
        if self.quality.observability_keywords.is_empty() {
            return Err(PipelineError::Config(
                "quality.observability_keywords must not be empty".into(),
            ));
        }
        if self.commit.default_category.trim().is_empty() {
            return Err(PipelineError::Config("commit.default_category must not be blank".into()));
        }
        for pattern in &self.quality.forbidden_patterns {
            regex::Regex::new(pattern)
                .map_err(|e| PipelineError::Config(format!("forbidden pattern {pattern:?}: {e}")))?;
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
