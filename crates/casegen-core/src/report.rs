//! Stage reports
//!
//! Every fallback or repair path that fires while a stage runs is recorded
//! as a [`FallbackEvent`]. The events are stored on the stage's draft and
//! returned to the caller in a [`StageReport`].

use crate::llm::{Stage, Usage};
use casegen_kernel::Phase;
use serde::{Deserialize, Serialize};

/// A fallback or repair path that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FallbackEvent {
    /// Provider rejected strict JSON mode; the rest of the ladder ran without it
    StrictJsonRetracted { stage: Stage },
    /// A regenerate call was issued
    Regenerated { stage: Stage },
    /// A syntax-repair call was issued
    SyntaxRepaired { stage: Stage },
    /// Local parser needed candidate extraction or repairs
    ContractRecovered {
        stage: Stage,
        candidate: String,
        repairs: String,
    },
    /// Response stayed empty; an empty payload was substituted
    EmptyPayloadSubstituted { stage: Stage },
    /// Claims were extracted without the model
    DeterministicIr { reason: String },
    /// Analysis items were derived from the IR without the model
    DeterministicAnalysis { reason: String },
    /// One backfill round ran
    BackfillRound {
        round: usize,
        batches: usize,
        seeds_added: usize,
    },
    /// Remaining coverage gaps were closed by synthesis
    DeterministicBackfill { seeds: usize },
    /// A supplementary call filled incomplete entries
    Supplemented { section: String, entries: usize },
    /// A whole section was replaced with baseline cases
    SectionBaseline { section: String, reason: String },
    /// One case was replaced with its baseline
    CaseBaseline { case_id: String, issues: Vec<String> },
    /// One case passed the gate after deterministic repair
    CaseRepaired { case_id: String },
    /// The lower API-style step floor applied to this case
    ApiStepFloor { case_id: String },
    /// The section path could not be created; the default category was used
    DefaultCategory {
        case_id: String,
        path: String,
        reason: String,
    },
}

impl FallbackEvent {
    /// Stable event name as serialized
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StrictJsonRetracted { .. } => "strict_json_retracted",
            Self::Regenerated { .. } => "regenerated",
            Self::SyntaxRepaired { .. } => "syntax_repaired",
            Self::ContractRecovered { .. } => "contract_recovered",
            Self::EmptyPayloadSubstituted { .. } => "empty_payload_substituted",
            Self::DeterministicIr { .. } => "deterministic_ir",
            Self::DeterministicAnalysis { .. } => "deterministic_analysis",
            Self::BackfillRound { .. } => "backfill_round",
            Self::DeterministicBackfill { .. } => "deterministic_backfill",
            Self::Supplemented { .. } => "supplemented",
            Self::SectionBaseline { .. } => "section_baseline",
            Self::CaseBaseline { .. } => "case_baseline",
            Self::CaseRepaired { .. } => "case_repaired",
            Self::ApiStepFloor { .. } => "api_step_floor",
            Self::DefaultCategory { .. } => "default_category",
        }
    }

    /// As a JSON value for draft traces
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Outcome of one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub phase: Phase,
    /// Version of the draft the stage wrote
    pub draft_version: u32,
    /// Fallback and repair paths in firing order
    pub events: Vec<FallbackEvent>,
    /// Model calls issued
    pub calls: usize,
    pub usage: Usage,
    pub cost: f64,
}

impl StageReport {
    /// Empty report for `phase`
    #[inline]
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            draft_version: 0,
            events: Vec::new(),
            calls: 0,
            usage: Usage::default(),
            cost: 0.0,
        }
    }

    /// No fallback path fired
    #[inline]
    #[must_use]
    pub fn is_nominal(&self) -> bool {
        self.events.is_empty()
    }

    /// Count events with the given name
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.name() == name).count()
    }

    /// Whether any event with the given name fired
    #[inline]
    #[must_use]
    pub fn fired(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    /// Sections replaced with baseline cases
    #[must_use]
    pub fn baseline_sections(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                FallbackEvent::SectionBaseline { section, .. } => Some(section.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Events as JSON values for the draft trace
    #[must_use]
    pub fn event_values(&self) -> Vec<serde_json::Value> {
        self.events.iter().map(FallbackEvent::to_value).collect()
    }
}
