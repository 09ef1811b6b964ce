//! Stage-1 entry assembly
//!
//! Merges analysis items and normalized seeds into numbered per-section
//! entries. Sections follow analysis section order; entries follow item
//! order, then seed order. Numbers start at `base` and step by `step`,
//! zero-padded to `width`, so `"010.020"` is the second entry of the first
//! section.

use crate::analysis::{sections, AnalysisItem, Aspect, Category, CoverageSeed, SeedState};
use crate::config::NumberingConfig;
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// One numbered unit of testcase work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage1Entry {
    /// `"{section_no}.{test_no}"`
    pub id: String,
    pub section_no: String,
    pub test_no: String,
    pub section: String,
    pub title: String,
    pub aspect: Aspect,
    pub category: Category,
    pub state: SeedState,
    pub analysis_ids: Vec<String>,
    pub requirement_ids: Vec<String>,
    pub details: Vec<String>,
    pub checks: Vec<String>,
    pub expected: Vec<String>,
    pub hints: Vec<String>,
    pub reference_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage1Section {
    pub number: String,
    pub name: String,
    pub entries: Vec<Stage1Entry>,
}

/// The pretestcase plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage1Plan {
    pub sections: Vec<Stage1Section>,
}

impl Stage1Plan {
    #[must_use]
    pub fn entries(&self) -> impl Iterator<Item = &Stage1Entry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `index`-th number (zero-based) under `numbering`
///
/// # Errors
/// [`PipelineError::Validation`] when the number needs more than `width` digits.
pub fn number(numbering: &NumberingConfig, index: usize) -> PipelineResult<String> {
    let value = u64::from(numbering.base) + index as u64 * u64::from(numbering.step);
    let formatted = format!("{value:0width$}", width = numbering.width);
    if formatted.len() > numbering.width {
        return Err(PipelineError::validation(format!(
            "number {value} at position {} does not fit in {} digits",
            index + 1,
            numbering.width
        )));
    }
    Ok(formatted)
}

/// Assemble the plan.
///
/// # Errors
/// [`PipelineError::Validation`] when a seed refers to no known item, or
/// when a section or entry number outgrows the configured width.
pub fn assemble(
    items: &[AnalysisItem],
    seeds: &[CoverageSeed],
    numbering: &NumberingConfig,
) -> PipelineResult<Stage1Plan> {
    for seed in seeds {
        let known = seed
            .analysis_id()
            .is_some_and(|id| items.iter().any(|i| i.id == id));
        if !known {
            return Err(PipelineError::validation(format!(
                "seed '{}' refers to unknown analysis item {:?}",
                seed.title, seed.analysis_ids
            )));
        }
    }

    let mut plan = Stage1Plan::default();
    for (s_idx, name) in sections(items).into_iter().enumerate() {
        let section_no = number(numbering, s_idx)?;
        let mut entries = Vec::new();
        for item in items.iter().filter(|i| i.section == name) {
            for seed in seeds.iter().filter(|s| s.analysis_id() == Some(item.id.as_str())) {
                let test_no = number(numbering, entries.len())?;
                entries.push(Stage1Entry {
                    id: format!("{section_no}.{test_no}"),
                    section_no: section_no.clone(),
                    test_no,
                    section: name.to_string(),
                    title: seed.title.clone(),
                    aspect: seed.aspect,
                    category: seed.category,
                    state: seed.state,
                    analysis_ids: vec![item.id.clone()],
                    requirement_ids: item.requirement_ids.clone(),
                    details: item.details.clone(),
                    checks: if seed.checks.is_empty() {
                        item.checks.clone()
                    } else {
                        seed.checks.clone()
                    },
                    expected: if seed.expected.is_empty() {
                        item.expected.clone()
                    } else {
                        seed.expected.clone()
                    },
                    hints: seed.hints.clone(),
                    reference_column: seed.reference_column.clone(),
                });
            }
        }
        if !entries.is_empty() {
            plan.sections.push(Stage1Section {
                number: section_no,
                name: name.to_string(),
                entries,
            });
        }
    }
    tracing::debug!(sections = plan.sections.len(), entries = plan.len(), "stage-1 plan assembled");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::item;
    use pretty_assertions::assert_eq;

    #[test]
    fn composite_ids_step_by_ten() {
        let items = vec![
            item(1, 1, "Login", "Valid OTP"),
            item(1, 2, "Login", "Expired OTP"),
            item(2, 1, "Audit", "Attempts"),
        ];
        let seeds = vec![
            CoverageSeed::for_item(&items[1], Aspect::Error),
            CoverageSeed::for_item(&items[0], Aspect::Happy),
            CoverageSeed::for_item(&items[0], Aspect::Edge),
            CoverageSeed::for_item(&items[2], Aspect::Permission),
        ];
        let plan = assemble(&items, &seeds, &NumberingConfig::default()).unwrap();
        let ids: Vec<_> = plan.entries().map(|e| (e.id.as_str(), e.title.as_str())).collect();
        assert_eq!(
            ids,
            vec![
                ("010.010", "Valid OTP"),
                ("010.020", "Valid OTP"),
                ("010.030", "Expired OTP"),
                ("020.010", "Attempts"),
            ]
        );
        assert_eq!(plan.sections[1].number, "020");
        assert_eq!(plan.entries().nth(1).unwrap().aspect, Aspect::Edge);
    }

    #[test]
    fn entries_fall_back_to_item_checks() {
        let items = vec![item(1, 1, "Login", "Valid OTP")];
        let mut seed = CoverageSeed::for_item(&items[0], Aspect::Happy);
        seed.checks.clear();
        seed.hints = vec!["account exists".into()];
        let plan = assemble(&items, &[seed], &NumberingConfig::default()).unwrap();
        let entry = plan.entries().next().unwrap();
        assert_eq!(entry.checks, vec!["Check Valid OTP"]);
        assert_eq!(entry.hints, vec!["account exists"]);
    }

    #[test]
    fn unknown_refs_are_rejected() {
        let items = vec![item(1, 1, "Login", "Valid OTP")];
        let mut seed = CoverageSeed::for_item(&items[0], Aspect::Happy);
        seed.analysis_ids = vec!["009.009".into()];
        let err = assemble(&items, &[seed], &NumberingConfig::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn custom_numbering() {
        let numbering = NumberingConfig {
            base: 100,
            step: 5,
            width: 4,
        };
        assert_eq!(number(&numbering, 0).unwrap(), "0100");
        assert_eq!(number(&numbering, 3).unwrap(), "0115");
    }

    #[test]
    fn numbers_never_outgrow_the_width() {
        let numbering = NumberingConfig::default();
        assert_eq!(number(&numbering, 98).unwrap(), "990");
        assert!(number(&numbering, 99).unwrap_err().is_validation());
    }

    #[test]
    fn oversized_section_is_rejected() {
        let items = vec![item(1, 1, "Login", "Valid OTP")];
        let seeds: Vec<CoverageSeed> = (0..100)
            .map(|n| {
                let mut seed = CoverageSeed::for_item(&items[0], Aspect::Happy);
                seed.title = format!("Valid OTP variant {n}");
                seed
            })
            .collect();
        let plan = assemble(&items, &seeds[..99], &NumberingConfig::default()).unwrap();
        assert_eq!(plan.entries().last().unwrap().id, "010.990");
        let err = assemble(&items, &seeds, &NumberingConfig::default()).unwrap_err();
        assert!(err.is_validation(), "{err}");
    }
}
