//! Deterministic analysis and gap-closing seeds
//!
//! Used when the model yields no usable analysis, and after the last
//! backfill round when seeds still leave items, sections or aspects
//! uncovered.

use crate::analysis::completeness::CoverageGap;
use crate::analysis::payload::{assign_ids, DEFAULT_SECTION};
use crate::analysis::seeds::{column_checks, column_expected};
use crate::analysis::{AnalysisItem, Aspect, Category, CoverageSeed, SeedState};
use crate::ir::{Claim, ClaimKind, RequirementIr};
use crate::keywords::Keywords;

const FLOWS: &str = "Functional flows";
const RULES: &str = "Business rules";
const COLUMNS: &str = "Reference columns";
const NON_FUNCTIONAL: &str = "Non-functional";

fn title_of(text: &str) -> String {
    text.trim().trim_end_matches(['.', '。', '!', ';']).trim().to_string()
}

fn claim_item(section: &str, claim: &Claim) -> AnalysisItem {
    let title = title_of(&claim.text);
    AnalysisItem {
        id: String::new(),
        section: section.to_string(),
        details: if claim.citation.quote.is_empty() {
            Vec::new()
        } else {
            vec![claim.citation.quote.clone()]
        },
        checks: vec![format!("Verify: {title}")],
        expected: vec![format!("The system behaves as stated: {title}")],
        requirement_ids: vec![claim.id.clone()],
        title,
    }
}

/// Items derived from IR claims and reference columns
#[must_use]
pub fn deterministic_analysis(ir: &RequirementIr) -> Vec<AnalysisItem> {
    let mut items: Vec<AnalysisItem> = ir.claims_of(ClaimKind::Flow).map(|c| claim_item(FLOWS, c)).collect();

    let column_prefixes: Vec<String> = ir
        .reference_columns
        .iter()
        .map(|c| format!("Column {}", c.name))
        .collect();
    let is_column_claim = |claim: &Claim| column_prefixes.iter().any(|p| claim.text.starts_with(p.as_str()));

    items.extend(
        ir.claims_of(ClaimKind::Rule)
            .filter(|c| !is_column_claim(c))
            .map(|c| claim_item(RULES, c)),
    );

    for (column, prefix) in ir.reference_columns.iter().zip(&column_prefixes) {
        items.push(AnalysisItem {
            id: String::new(),
            section: COLUMNS.to_string(),
            title: prefix.clone(),
            details: Vec::new(),
            checks: column_checks(column),
            expected: column_expected(column),
            requirement_ids: ir
                .claims
                .iter()
                .filter(|c| c.text.starts_with(prefix.as_str()))
                .map(|c| c.id.clone())
                .collect(),
        });
    }

    items.extend(ir.claims_of(ClaimKind::NonFunctional).map(|c| claim_item(NON_FUNCTIONAL, c)));

    if items.is_empty() {
        let summary = ir.meta.summary.trim();
        let title = if summary.is_empty() {
            format!("{} behaves as described", ir.meta.key)
        } else {
            title_of(summary)
        };
        items.push(AnalysisItem {
            id: String::new(),
            section: DEFAULT_SECTION.to_string(),
            checks: vec![format!("Verify: {title}")],
            expected: vec![format!("The system behaves as stated: {title}")],
            title,
            details: Vec::new(),
            requirement_ids: ir.claims.iter().map(|c| c.id.clone()).collect(),
        });
    }

    assign_ids(items)
}

fn matches_aspect(keywords: &Keywords, aspect: Aspect, evidence: &str) -> bool {
    match aspect {
        Aspect::Happy => keywords.category_of(evidence).is_none(),
        Aspect::Edge => keywords.boundary.matches(evidence),
        Aspect::Error => keywords.negative.matches(evidence),
        Aspect::Permission => keywords.permission.matches(evidence),
    }
}

fn assumed(item: &AnalysisItem, aspect: Aspect) -> CoverageSeed {
    let mut seed = CoverageSeed::for_item(item, aspect);
    seed.state = SeedState::Assume;
    seed
}

/// Seeds closing every gap in `gap`, in item order.
///
/// Uncovered items and sections get one seed each, with the aspect the
/// item's evidence suggests. Each missing aspect is projected onto the
/// item whose evidence matches it best, else onto the first item.
#[must_use]
pub fn synthesize_seeds(
    items: &[AnalysisItem],
    existing: &[CoverageSeed],
    gap: &CoverageGap,
    keywords: &Keywords,
) -> Vec<CoverageSeed> {
    let mut out: Vec<CoverageSeed> = Vec::new();
    let seeded = |out: &[CoverageSeed], id: &str| {
        existing.iter().chain(out).any(|s| s.analysis_ids.iter().any(|r| r == id))
    };
    let grouped = |out: &[CoverageSeed], section: &str| {
        out.iter().any(|s| s.group.trim().eq_ignore_ascii_case(section.trim()))
    };

    for item in items {
        let missing_id = gap.missing_ids.contains(&item.id) && !seeded(&out, &item.id);
        let missing_section = gap
            .missing_sections
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(item.section.trim()))
            && !grouped(&out, &item.section);
        if missing_id || missing_section {
            let aspect = keywords
                .category_of(&item.evidence())
                .map_or(Aspect::Happy, Category::aspect);
            out.push(assumed(item, aspect));
        }
    }

    for aspect in &gap.missing_aspects {
        let Some(item) = items
            .iter()
            .find(|i| matches_aspect(keywords, *aspect, &i.evidence()))
            .or_else(|| items.first())
        else {
            break;
        };
        if out.iter().any(|s| s.aspect == *aspect) {
            continue;
        }
        let mut seed = assumed(item, *aspect);
        seed.title = format!("{} ({aspect})", item.title);
        out.push(seed);
    }
    out
}
