//! Deterministic baseline cases
//!
//! Built straight from a stage-1 entry before any model call. A baseline
//! always passes the [`QualityGate`] it was built with.

use crate::analysis::Aspect;
use crate::stage1::Stage1Entry;
use crate::testcase::{case_id, section_path, GeneratedTestCase, Priority, QualityGate};

/// Baseline case for `entry`
#[must_use]
pub fn build_baseline(entry: &Stage1Entry, ticket: &str, gate: &QualityGate) -> GeneratedTestCase {
    let clean = |lines: &[String]| -> Vec<String> {
        lines
            .iter()
            .map(|l| gate.sanitize(l))
            .filter(|l| !l.is_empty())
            .collect()
    };

    let section = gate.sanitize(&entry.section);
    let mut title = gate.sanitize(&entry.title);
    if title.is_empty() {
        title = if section.is_empty() {
            format!("Verify entry {}", entry.id)
        } else {
            format!("Verify {section} entry {}", entry.id)
        };
    }

    let mut preconditions = clean(&entry.hints);
    preconditions.push("The system under test is available".to_string());
    let mut n = 1;
    while preconditions.len() < gate.min_preconditions {
        preconditions.push(format!("Test data set {n} for '{title}' is prepared"));
        n += 1;
    }

    let mut steps = vec![if section.is_empty() {
        "Open the feature under test".to_string()
    } else {
        format!("Open the feature under test: {section}")
    }];
    let checks = clean(&entry.checks);
    if checks.is_empty() {
        steps.push(format!("Perform the action described in '{title}'"));
    }
    steps.extend(checks);
    steps.push("Observe the system response".to_string());
    let mut n = 1;
    while steps.len() < gate.min_steps {
        steps.push(format!("Repeat observation {n} and compare with the previous result"));
        n += 1;
    }

    let expected = clean(&entry.expected)
        .into_iter()
        .next()
        .map_or_else(
            || format!("The system shows the result described in '{title}'"),
            |line| gate.observable(&line),
        );

    GeneratedTestCase {
        id: case_id(ticket, entry),
        entry_id: entry.id.clone(),
        title,
        preconditions,
        steps,
        expected: vec![expected],
        priority: match entry.aspect {
            Aspect::Happy | Aspect::Permission => Priority::High,
            Aspect::Edge | Aspect::Error => Priority::Medium,
        },
        section_path: section_path(ticket, entry),
    }
}
