//! Quality gate
//!
//! A case passes when it has a title, at least `min_preconditions`
//! preconditions, at least `min_steps` steps (`api_min_steps` for API-style
//! titles), exactly one expected line containing an observability keyword,
//! and no text matching a forbidden pattern.

use crate::config::QualityConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::keywords::KeywordSet;
use crate::testcase::GeneratedTestCase;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Why a case fails the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum QualityIssue {
    MissingTitle,
    TooFewPreconditions { found: usize, required: usize },
    TooFewSteps { found: usize, required: usize },
    ExpectedCount { found: usize },
    NotObservable,
    Forbidden { pattern: String },
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTitle => f.write_str("missing title"),
            Self::TooFewPreconditions { found, required } => {
                write!(f, "{found} preconditions, {required} required")
            }
            Self::TooFewSteps { found, required } => write!(f, "{found} steps, {required} required"),
            Self::ExpectedCount { found } => write!(f, "{found} expected lines, exactly 1 required"),
            Self::NotObservable => f.write_str("expected result is not observable"),
            Self::Forbidden { pattern } => write!(f, "forbidden pattern {pattern}"),
        }
    }
}

/// Compiled gate
#[derive(Debug, Clone)]
pub struct QualityGate {
    pub min_preconditions: usize,
    pub min_steps: usize,
    pub api_min_steps: usize,
    forbidden: Vec<Regex>,
    observability: KeywordSet,
    api_titles: KeywordSet,
}

impl QualityGate {
    /// # Errors
    /// [`PipelineError::Config`] for a pattern or keyword list that fails to compile.
    pub fn from_config(config: &QualityConfig) -> PipelineResult<Self> {
        let forbidden = config
            .forbidden_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| PipelineError::Config(format!("forbidden pattern {p:?}: {e}"))))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self {
            min_preconditions: config.min_preconditions,
            min_steps: config.min_steps,
            api_min_steps: config.api_min_steps.min(config.min_steps),
            forbidden,
            observability: KeywordSet::new(&config.observability_keywords)?,
            api_titles: KeywordSet::new(&config.api_title_keywords)?,
        })
    }

    /// Title looks like an API test
    #[must_use]
    pub fn is_api_style(&self, case: &GeneratedTestCase) -> bool {
        self.api_titles.matches(&case.title)
    }

    /// Whether the API floor lowers this case's step requirement
    #[must_use]
    pub fn api_floor_applies(&self, case: &GeneratedTestCase) -> bool {
        self.api_min_steps < self.min_steps && self.is_api_style(case)
    }

    #[must_use]
    pub fn required_steps(&self, case: &GeneratedTestCase) -> usize {
        if self.is_api_style(case) {
            self.api_min_steps
        } else {
            self.min_steps
        }
    }

    #[must_use]
    pub fn is_observable(&self, line: &str) -> bool {
        self.observability.matches(line)
    }

    fn forbidden_in(&self, text: &str) -> Option<&Regex> {
        self.forbidden.iter().find(|r| r.is_match(text))
    }

    /// All gate failures, in check order
    #[must_use]
    pub fn check(&self, case: &GeneratedTestCase) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        if case.title.trim().is_empty() {
            issues.push(QualityIssue::MissingTitle);
        }
        if case.preconditions.len() < self.min_preconditions {
            issues.push(QualityIssue::TooFewPreconditions {
                found: case.preconditions.len(),
                required: self.min_preconditions,
            });
        }
        let required = self.required_steps(case);
        if case.steps.len() < required {
            issues.push(QualityIssue::TooFewSteps {
                found: case.steps.len(),
                required,
            });
        }
        match case.expected.as_slice() {
            [line] if !self.is_observable(line) => issues.push(QualityIssue::NotObservable),
            [_] => {}
            other => issues.push(QualityIssue::ExpectedCount { found: other.len() }),
        }
        let texts = std::iter::once(&case.title)
            .chain(&case.preconditions)
            .chain(&case.steps)
            .chain(&case.expected);
        for text in texts {
            if let Some(regex) = self.forbidden_in(text) {
                let issue = QualityIssue::Forbidden {
                    pattern: regex.as_str().to_string(),
                };
                if !issues.contains(&issue) {
                    issues.push(issue);
                }
            }
        }
        issues
    }

    #[must_use]
    pub fn passes(&self, case: &GeneratedTestCase) -> bool {
        self.check(case).is_empty()
    }

    /// Text with forbidden matches removed and whitespace collapsed
    #[must_use]
    pub fn sanitize(&self, text: &str) -> String {
        let mut out = text.to_string();
        for regex in &self.forbidden {
            out = regex.replace_all(&out, "").into_owned();
        }
        let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .trim_matches(|c: char| c == ':' || c == '-' || c == ',' || c.is_whitespace())
            .to_string()
    }

    fn clean(&self, lines: &[String]) -> Vec<String> {
        lines
            .iter()
            .map(|l| self.sanitize(l))
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Expected line made observable
    #[must_use]
    pub fn observable(&self, line: &str) -> String {
        if self.is_observable(line) {
            return line.to_string();
        }
        format!("The system shows that {}", lower_first(line))
    }

    /// Deterministic repair against the entry's baseline.
    ///
    /// Preconditions and steps are padded from the baseline, extra expected
    /// lines become verification steps, a non-observable expected line is
    /// rephrased and forbidden text is stripped. The result may still fail
    /// when the case carried nothing usable.
    #[must_use]
    pub fn repair(&self, case: &GeneratedTestCase, baseline: &GeneratedTestCase) -> GeneratedTestCase {
        let mut repaired = case.clone();

        repaired.title = self.sanitize(&case.title);
        if repaired.title.is_empty() {
            repaired.title.clone_from(&baseline.title);
        }

        repaired.preconditions = self.clean(&case.preconditions);
        pad_from(&mut repaired.preconditions, &baseline.preconditions, self.min_preconditions);

        let mut expected = self.clean(&case.expected);
        let primary = expected
            .iter()
            .position(|l| self.is_observable(l))
            .unwrap_or(0);
        let main = if expected.is_empty() {
            baseline.expected.first().cloned().unwrap_or_default()
        } else {
            expected.remove(primary)
        };

        repaired.steps = self.clean(&case.steps);
        repaired
            .steps
            .extend(expected.into_iter().map(|l| format!("Verify that {}", lower_first(&l))));
        let required = self.required_steps(&repaired);
        pad_from(&mut repaired.steps, &baseline.steps, required);

        repaired.expected = vec![self.observable(&main)];
        repaired
    }
}

fn pad_from(lines: &mut Vec<String>, source: &[String], min: usize) {
    for line in source {
        if lines.len() >= min {
            break;
        }
        if !lines.contains(line) {
            lines.push(line.clone());
        }
    }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && !second.is_uppercase() => {
            first.to_lowercase().chain(text.chars().skip(1)).collect()
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::Priority;
    use pretty_assertions::assert_eq;

    fn gate() -> QualityGate {
        QualityGate::from_config(&QualityConfig::default()).unwrap()
    }

    fn case(title: &str, pre: &[&str], steps: &[&str], expected: &[&str]) -> GeneratedTestCase {
        let own = |v: &[&str]| v.iter().map(|s| (*s).to_string()).collect();
        GeneratedTestCase {
            id: "TCG-1.010.010".into(),
            entry_id: "010.010".into(),
            title: title.into(),
            preconditions: own(pre),
            steps: own(steps),
            expected: own(expected),
            priority: Priority::High,
            section_path: "TCG-1.Login".into(),
        }
    }

    fn baseline() -> GeneratedTestCase {
        case(
            "Valid OTP",
            &["The system under test is available"],
            &["Open the feature under test: Login", "Enter a valid OTP", "Observe the system response"],
            &["The dashboard is shown"],
        )
    }

    #[test]
    fn strict_check_flags_each_rule() {
        let g = gate();
        let bad = case("Valid OTP", &[], &["Enter OTP"], &["Dashboard is shown", "Session starts"]);
        assert_eq!(
            g.check(&bad),
            vec![
                QualityIssue::TooFewPreconditions { found: 0, required: 1 },
                QualityIssue::TooFewSteps { found: 1, required: 3 },
                QualityIssue::ExpectedCount { found: 2 },
            ]
        );
        let vague = case("Valid OTP", &["x"], &["a", "b", "c"], &["TBD"]);
        let issues = g.check(&vague);
        assert!(issues.contains(&QualityIssue::NotObservable));
        assert!(issues.iter().any(|i| matches!(i, QualityIssue::Forbidden { .. })));
        assert!(g.passes(&baseline()));
    }

    #[test]
    fn api_titles_use_the_lower_floor() {
        let g = gate();
        let api = case("POST /login API rejects expired OTP", &["x"], &["Send request", "Read body"], &["Response status is 401"]);
        assert!(g.is_api_style(&api));
        assert!(g.api_floor_applies(&api));
        assert!(g.passes(&api));
    }

    #[test]
    fn repair_pads_and_folds() {
        let g = gate();
        let bad = case("Valid OTP", &[], &["Enter OTP"], &["Session starts", "Dashboard is shown"]);
        let repaired = g.repair(&bad, &baseline());
        assert!(g.passes(&repaired), "{:?}", g.check(&repaired));
        assert_eq!(repaired.expected, vec!["Dashboard is shown"]);
        assert_eq!(repaired.steps[0], "Enter OTP");
        assert_eq!(repaired.steps[1], "Verify that session starts");
        assert_eq!(repaired.preconditions, vec!["The system under test is available"]);
    }

    #[test]
    fn repair_strips_placeholders_and_rephrases() {
        let g = gate();
        let bad = case("Valid OTP TBD", &["N/A"], &["a", "b", "c"], &["Payment succeeds"]);
        let repaired = g.repair(&bad, &baseline());
        assert_eq!(repaired.title, "Valid OTP");
        assert_eq!(repaired.expected, vec!["The system shows that payment succeeds"]);
        assert!(g.passes(&repaired));
    }

    #[test]
    fn sanitize_collapses_leftovers() {
        assert_eq!(gate().sanitize("Amount: TBD"), "Amount");
        assert_eq!(gate().sanitize("  ???  "), "");
    }
}
