//! Seed normalization
//!
//! Applied after every coverage or backfill call, and idempotent:
//! - refs: unknown ids dropped; orphans resolved by title within their
//!   group, else the group's first item, else the seed is dropped
//! - fan-out: one seed per ref with every other field copied; a blank
//!   group takes the ref's section
//! - reference columns: checks and expected synthesized from column flags
//! - category: happy upgraded by negative/boundary keyword evidence
//! - dedup on (group, title, aspect, category, state, ref, checks, expected, hints)

use crate::analysis::{AnalysisItem, Aspect, Category, CoverageSeed, SeedState};
use crate::ir::{FixedSide, ReferenceColumn, RequirementIr};
use crate::keywords::Keywords;
use std::collections::HashSet;

type DedupKey = (
    String,
    String,
    Aspect,
    Category,
    SeedState,
    String,
    Vec<String>,
    Vec<String>,
    Vec<String>,
);

fn dedup_key(seed: &CoverageSeed) -> DedupKey {
    (
        seed.group.clone(),
        seed.title.clone(),
        seed.aspect,
        seed.category,
        seed.state,
        seed.analysis_id().unwrap_or_default().to_string(),
        seed.checks.clone(),
        seed.expected.clone(),
        seed.hints.clone(),
    )
}

/// Checks derived from a column's flags
#[must_use]
pub fn column_checks(column: &ReferenceColumn) -> Vec<String> {
    let name = &column.name;
    let mut checks = vec![format!("Column '{name}' is displayed in the list")];
    if column.is_new {
        checks.push(format!("Column '{name}' is present as a newly added column"));
    }
    if column.sortable {
        checks.push(format!("Sorting by '{name}' orders rows ascending and descending"));
    } else {
        checks.push(format!("Column '{name}' offers no sort control"));
    }
    match column.fixed {
        FixedSide::Left | FixedSide::Right => {
            let side = if column.fixed == FixedSide::Left { "left" } else { "right" };
            checks.push(format!("Column '{name}' stays pinned to the {side} while scrolling horizontally"));
        }
        FixedSide::None => {}
    }
    if let Some(rules) = &column.format_rules {
        checks.push(format!("Values in '{name}' follow the format: {rules}"));
    }
    if let Some(param) = &column.cross_page_parameter {
        checks.push(format!("Cross-page parameter '{param}' carries the '{name}' value to the target page"));
    }
    if let Some(note) = &column.edit_note {
        checks.push(format!("Editing '{name}' behaves as noted: {note}"));
    }
    checks
}

/// Expected result for a column seed
#[must_use]
pub fn column_expected(column: &ReferenceColumn) -> Vec<String> {
    let mut expected = format!("The list displays column '{}'", column.name);
    if column.sortable {
        expected.push_str(" and sorts by it");
    }
    if let Some(rules) = &column.format_rules {
        expected.push_str(&format!(" with values formatted as {rules}"));
    }
    vec![expected]
}

/// Normalizes seeds against items and the IR
pub struct SeedNormalizer<'a> {
    items: &'a [AnalysisItem],
    ir: &'a RequirementIr,
    keywords: &'a Keywords,
}

impl std::fmt::Debug for SeedNormalizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedNormalizer")
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl<'a> SeedNormalizer<'a> {
    #[must_use]
    pub fn new(items: &'a [AnalysisItem], ir: &'a RequirementIr, keywords: &'a Keywords) -> Self {
        Self { items, ir, keywords }
    }

    fn item(&self, id: &str) -> Option<&'a AnalysisItem> {
        self.items.iter().find(|i| i.id == id)
    }

    #[must_use]
    pub fn normalize(&self, seeds: Vec<CoverageSeed>) -> Vec<CoverageSeed> {
        let mut out = Vec::new();
        let mut seen: HashSet<DedupKey> = HashSet::new();
        for seed in seeds {
            let refs = self.resolve_refs(&seed);
            if refs.is_empty() {
                tracing::debug!(title = %seed.title, group = %seed.group, "dropping seed without resolvable ref");
                continue;
            }
            for item in refs {
                let mut fanned = seed.clone();
                fanned.analysis_ids = vec![item.id.clone()];
                if fanned.group.trim().is_empty() {
                    fanned.group = item.section.clone();
                }
                self.apply_reference_column(&mut fanned);
                self.upgrade_category(&mut fanned, item);
                if seen.insert(dedup_key(&fanned)) {
                    out.push(fanned);
                }
            }
        }
        out
    }

    fn resolve_refs(&self, seed: &CoverageSeed) -> Vec<&'a AnalysisItem> {
        let mut known: Vec<&AnalysisItem> = Vec::new();
        for id in &seed.analysis_ids {
            if let Some(item) = self.item(id.trim()) {
                if !known.iter().any(|k| k.id == item.id) {
                    known.push(item);
                }
            }
        }
        if !known.is_empty() {
            return known;
        }

        let group = seed.group.trim();
        let in_group: Vec<&AnalysisItem> = self
            .items
            .iter()
            .filter(|i| !group.is_empty() && i.section.eq_ignore_ascii_case(group))
            .collect();
        let title = seed.title.to_lowercase();
        let by_title = in_group.iter().copied().find(|i| {
            let t = i.title.to_lowercase();
            t == title || t.contains(&title) || title.contains(&t)
        });
        by_title.or_else(|| in_group.first().copied()).into_iter().collect()
    }

    fn apply_reference_column(&self, seed: &mut CoverageSeed) {
        let Some(column) = seed
            .reference_column
            .as_deref()
            .and_then(|name| self.ir.reference_column(name))
        else {
            return;
        };
        seed.reference_column = Some(column.name.clone());
        seed.checks = column_checks(column);
        seed.expected = column_expected(column);
    }

    fn upgrade_category(&self, seed: &mut CoverageSeed, item: &AnalysisItem) {
        if seed.category != Category::Happy {
            return;
        }
        let evidence = format!("{} {}", seed.evidence(), item.evidence());
        if let Some(category) = self.keywords.category_of(&evidence) {
            seed.category = category;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordConfig;
    use crate::test_support::{ir_with, item};
    use pretty_assertions::assert_eq;

    fn seed(title: &str, group: &str, refs: &[&str]) -> CoverageSeed {
        CoverageSeed {
            group: group.to_string(),
            title: title.to_string(),
            aspect: Aspect::Happy,
            category: Category::Happy,
            state: SeedState::Ok,
            analysis_ids: refs.iter().map(|r| (*r).to_string()).collect(),
            checks: Vec::new(),
            expected: Vec::new(),
            hints: Vec::new(),
            reference_column: None,
        }
    }

    fn fixture() -> (Vec<AnalysisItem>, RequirementIr, Keywords) {
        let items = vec![
            item(1, 1, "Login", "Valid OTP"),
            item(1, 2, "Login", "OTP expiry"),
            item(2, 1, "Audit", "Attempts recorded"),
        ];
        (items, ir_with(&[]), Keywords::from_config(&KeywordConfig::default()).unwrap())
    }

    #[test]
    fn multi_ref_seeds_fan_out() {
        let (items, ir, kw) = fixture();
        let out = SeedNormalizer::new(&items, &ir, &kw)
            .normalize(vec![seed("Both", "Login", &["001.001", "002.001", "999.999"])]);
        let refs: Vec<_> = out.iter().map(|s| (s.analysis_id().unwrap(), s.group.as_str())).collect();
        assert_eq!(refs, vec![("001.001", "Login"), ("002.001", "Login")]);
    }

    #[test]
    fn fan_out_copies_every_other_field() {
        let (items, ir, kw) = fixture();
        let mut original = seed("Checkout across modules", "Checkout", &["001.001", "002.001"]);
        original.state = SeedState::Assume;
        original.checks = vec!["Check the order total".into()];
        original.expected = vec!["The total is shown".into()];
        original.hints = vec!["cart holds two items".into()];
        let out = SeedNormalizer::new(&items, &ir, &kw).normalize(vec![original.clone()]);

        assert_eq!(out.len(), 2);
        for (fanned, id) in out.iter().zip(["001.001", "002.001"]) {
            let mut expected = original.clone();
            expected.analysis_ids = vec![id.to_string()];
            assert_eq!(fanned, &expected);
        }
    }

    #[test]
    fn blank_group_takes_the_ref_section() {
        let (items, ir, kw) = fixture();
        let out = SeedNormalizer::new(&items, &ir, &kw).normalize(vec![seed("Attempts recorded", " ", &["002.001"])]);
        assert_eq!(out[0].group, "Audit");
    }

    #[test]
    fn orphans_resolve_by_title_then_group() {
        let (items, ir, kw) = fixture();
        let out = SeedNormalizer::new(&items, &ir, &kw).normalize(vec![
            seed("otp expiry", "login", &[]),
            seed("Something else", "Login", &["bogus"]),
            seed("Nowhere", "Missing", &[]),
        ]);
        let refs: Vec<_> = out.iter().map(|s| s.analysis_id().unwrap()).collect();
        assert_eq!(refs, vec!["001.002", "001.001"]);
    }

    #[test]
    fn happy_seeds_upgrade_from_evidence() {
        let (items, ir, kw) = fixture();
        let out = SeedNormalizer::new(&items, &ir, &kw).normalize(vec![
            seed("OTP entered after it expires", "Login", &["001.002"]),
            seed("Valid OTP", "Login", &["001.001"]),
        ]);
        assert_eq!(out[0].category, Category::Negative);
        assert_eq!(out[0].aspect, Aspect::Happy);
        assert_eq!(out[1].category, Category::Happy);
    }

    #[test]
    fn duplicates_collapse() {
        let (items, ir, kw) = fixture();
        let out = SeedNormalizer::new(&items, &ir, &kw).normalize(vec![
            seed("Valid OTP", "Login", &["001.001"]),
            seed("Valid OTP", "Login", &["001.001", "001.001"]),
        ]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn reference_column_seeds_get_synthesized_checks() {
        let (items, mut ir, kw) = fixture();
        ir.reference_columns.push(ReferenceColumn {
            name: "Order date".into(),
            is_new: true,
            sortable: true,
            fixed: FixedSide::Left,
            format_rules: Some("YYYY-MM-DD".into()),
            cross_page_parameter: None,
            edit_note: None,
            chunk_id: "table-1".into(),
            row: 0,
        });
        let mut s = seed("Order date column", "Login", &["001.001"]);
        s.reference_column = Some("order DATE".into());
        let out = SeedNormalizer::new(&items, &ir, &kw).normalize(vec![s]);
        assert_eq!(out[0].reference_column.as_deref(), Some("Order date"));
        assert_eq!(out[0].checks.len(), 5);
        assert!(out[0].checks[3].contains("pinned to the left"));
        assert_eq!(
            out[0].expected,
            vec!["The list displays column 'Order date' and sorts by it with values formatted as YYYY-MM-DD"]
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let (items, ir, kw) = fixture();
        let normalizer = SeedNormalizer::new(&items, &ir, &kw);
        let once = normalizer.normalize(vec![
            seed("Both", "Login", &["001.001", "001.002"]),
            seed("otp expiry", "login", &[]),
        ]);
        assert_eq!(normalizer.normalize(once.clone()), once);
    }
}
