//! Testcase generation
//!
//! - [`baseline`]: deterministic cases that always pass the gate
//! - [`align`]: maps model cases back onto stage-1 entries
//! - [`quality`]: the quality gate and deterministic repair
//! - [`generator`]: per-section generation, supplement, audit and repair

pub mod align;
pub mod baseline;
pub mod generator;
pub mod quality;

pub use align::align;
pub use baseline::build_baseline;
pub use generator::{TestcaseGenerator, TestcaseOutcome};
pub use quality::{QualityGate, QualityIssue};

use crate::payload::{array_at, list_field, str_field};
use crate::stage1::Stage1Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "high" | "p0" | "p1" | "critical" | "major" => Some(Priority::High),
            "medium" | "p2" | "normal" => Some(Priority::Medium),
            "low" | "p3" | "p4" | "minor" | "trivial" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// A finished test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTestCase {
    /// `"{ticket}.{section_no}.{test_no}"`
    pub id: String,
    /// Stage-1 entry id
    pub entry_id: String,
    pub title: String,
    pub preconditions: Vec<String>,
    pub steps: Vec<String>,
    /// Exactly one line once complete
    pub expected: Vec<String>,
    pub priority: Priority,
    /// Dotted category path, e.g. `"TCG-1.Login"`
    pub section_path: String,
}

impl GeneratedTestCase {
    /// Has a title, steps and exactly one expected line
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.steps.is_empty() && self.expected.len() == 1
    }
}

/// Full case id for an entry
#[must_use]
pub fn case_id(ticket: &str, entry: &Stage1Entry) -> String {
    format!("{ticket}.{}", entry.id)
}

/// Category path for an entry: the ticket, then the section name
#[must_use]
pub fn section_path(ticket: &str, entry: &Stage1Entry) -> String {
    format!("{ticket}.{}", entry.section.replace('.', " ").trim())
}

/// A case as the model returned it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCase {
    pub id: Option<String>,
    pub title: Option<String>,
    pub preconditions: Vec<String>,
    pub steps: Vec<String>,
    pub expected: Vec<String>,
    pub priority: Option<Priority>,
}

impl RawCase {
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: str_field(value, &["id", "entry_id", "case_id", "case_number"]),
            title: str_field(value, &["title", "name", "summary"]),
            preconditions: list_field(value, &["preconditions", "precondition", "prerequisites"]),
            steps: list_field(value, &["steps", "step", "actions"]),
            expected: list_field(value, &["expected", "expected_result", "expected_results"]),
            priority: str_field(value, &["priority"]).and_then(|p| Priority::parse(&p)),
        }
    }

    /// The case for `entry`; id and section path come from the entry
    #[must_use]
    pub fn into_case(self, ticket: &str, entry: &Stage1Entry, default_priority: Priority) -> GeneratedTestCase {
        GeneratedTestCase {
            id: case_id(ticket, entry),
            entry_id: entry.id.clone(),
            title: self.title.unwrap_or_default(),
            preconditions: self.preconditions,
            steps: self.steps,
            expected: self.expected,
            priority: self.priority.unwrap_or(default_priority),
            section_path: section_path(ticket, entry),
        }
    }
}

/// Cases from a generation, supplement, audit or repair payload
#[must_use]
pub fn raw_cases(value: &Value) -> Vec<RawCase> {
    array_at(value, &["cases", "testcases", "test_cases"])
        .map(|cases| cases.iter().filter(|c| c.is_object()).map(RawCase::from_value).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn raw_cases_accept_aliases() {
        let value = json!({"test_cases": [
            {"case_id": "010.010", "name": "Login", "precondition": "Account exists",
             "steps": [{"step": "Open login"}, "Enter OTP"], "expected_result": "Dashboard is shown",
             "priority": "P1"},
            "not a case"
        ]});
        let cases = raw_cases(&value);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id.as_deref(), Some("010.010"));
        assert_eq!(cases[0].preconditions, vec!["Account exists"]);
        assert_eq!(cases[0].steps, vec!["Open login", "Enter OTP"]);
        assert_eq!(cases[0].expected, vec!["Dashboard is shown"]);
        assert_eq!(cases[0].priority, Some(Priority::High));
    }

    #[test]
    fn completeness() {
        let mut case = GeneratedTestCase {
            id: "T-1.010.010".into(),
            entry_id: "010.010".into(),
            title: "Login".into(),
            preconditions: vec![],
            steps: vec!["Open".into()],
            expected: vec!["Shown".into()],
            priority: Priority::Medium,
            section_path: "T-1.Login".into(),
        };
        assert!(case.is_complete());
        case.expected.push("Also shown".into());
        assert!(!case.is_complete());
    }
}
