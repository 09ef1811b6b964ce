//! Analysis and coverage payloads
//!
//! The analysis call may answer with sections holding items or with a flat
//! item list carrying a section field. Both variants are normalized here
//! into canonical [`AnalysisItem`]s with `"SSS.NNN"` ids assigned in
//! section order.

use crate::analysis::{item_id, AnalysisItem, Aspect, Category, CoverageSeed, SeedState};
use crate::ir::RequirementIr;
use crate::payload::{array_at, list_field, str_field};
use indexmap::IndexMap;
use serde_json::Value;

/// Section name used when none is given
pub const DEFAULT_SECTION: &str = "General";

/// Shapes the analysis call may answer with
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    /// `{"sections": [{"name": ..., "items": [...]}]}`
    Sectioned(Vec<(String, Vec<Value>)>),
    /// `{"items": [...]}` or a bare array; section per item
    Flat(Vec<Value>),
    /// Nothing usable
    Empty,
}

impl AnalysisPayload {
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if let Some(sections) = value.get("sections").and_then(Value::as_array) {
            return Self::Sectioned(
                sections
                    .iter()
                    .map(|s| {
                        let name = str_field(s, &["name", "title", "section"])
                            .unwrap_or_else(|| DEFAULT_SECTION.to_string());
                        let items = array_at(s, &["items", "analysis", "entries"])
                            .cloned()
                            .unwrap_or_default();
                        (name, items)
                    })
                    .collect(),
            );
        }
        match array_at(value, &["items", "analysis", "analysis_items"]) {
            Some(items) => Self::Flat(items.clone()),
            None => Self::Empty,
        }
    }

    /// Canonical items; unknown requirement ids are dropped
    #[must_use]
    pub fn into_items(self, ir: &RequirementIr) -> Vec<AnalysisItem> {
        let pairs: Vec<(String, Value)> = match self {
            Self::Sectioned(sections) => sections
                .into_iter()
                .flat_map(|(name, items)| items.into_iter().map(move |i| (name.clone(), i)))
                .collect(),
            Self::Flat(items) => items
                .into_iter()
                .map(|i| {
                    let section = str_field(&i, &["section", "group", "category"])
                        .unwrap_or_else(|| DEFAULT_SECTION.to_string());
                    (section, i)
                })
                .collect(),
            Self::Empty => Vec::new(),
        };

        let mut grouped: IndexMap<String, Vec<AnalysisItem>> = IndexMap::new();
        for (section, raw) in pairs {
            let title = match &raw {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                _ => match str_field(&raw, &["title", "name", "summary", "item"]) {
                    Some(t) => t,
                    None => continue,
                },
            };
            let mut requirement_ids: Vec<String> = Vec::new();
            for id in list_field(&raw, &["requirement_ids", "req_ids", "requirements", "refs"]) {
                if ir.claim(&id).is_some() && !requirement_ids.contains(&id) {
                    requirement_ids.push(id);
                }
            }
            let section = section.trim().to_string();
            let key = grouped
                .keys()
                .find(|k| k.eq_ignore_ascii_case(&section))
                .cloned()
                .unwrap_or(section);
            grouped.entry(key.clone()).or_default().push(AnalysisItem {
                id: String::new(),
                section: key,
                title,
                details: list_field(&raw, &["details", "detail", "description"]),
                checks: list_field(&raw, &["checks", "check", "checkpoints"]),
                expected: list_field(&raw, &["expected", "expected_results", "expected_result"]),
                requirement_ids,
            });
        }

        assign_ids(grouped.into_values().flatten().collect())
    }
}

/// Renumber items canonically: sections in first-appearance order
#[must_use]
pub fn assign_ids(items: Vec<AnalysisItem>) -> Vec<AnalysisItem> {
    let mut sections: IndexMap<String, usize> = IndexMap::new();
    let mut grouped: IndexMap<String, Vec<AnalysisItem>> = IndexMap::new();
    for item in items {
        let n = sections.len();
        sections.entry(item.section.clone()).or_insert(n + 1);
        grouped.entry(item.section.clone()).or_default().push(item);
    }
    grouped
        .into_iter()
        .flat_map(|(section, items)| {
            let s = sections.get(&section).copied().unwrap_or(0);
            items.into_iter().enumerate().map(move |(i, mut item)| {
                item.id = item_id(s, i + 1);
                item
            })
        })
        .collect()
}

/// Category fixed by `aspect`; a stated category only moves a happy seed away from happy
fn seed_category(aspect: Aspect, stated: Option<Category>) -> Category {
    match (aspect.category(), stated) {
        (Category::Happy, Some(stated)) => stated,
        (fixed, _) => fixed,
    }
}

/// Seeds from a coverage or backfill payload
#[must_use]
pub fn seeds_from_value(value: &Value) -> Vec<CoverageSeed> {
    let Some(raw) = array_at(value, &["seeds", "coverage", "coverage_seeds", "items"]) else {
        return Vec::new();
    };
    raw.iter()
        .filter_map(|s| {
            let title = str_field(s, &["title", "name", "summary"])?;
            let aspect = str_field(s, &["aspect", "type"]).and_then(|a| Aspect::parse(&a));
            let category = str_field(s, &["category"]).and_then(|c| Category::parse(&c));
            let aspect = aspect.or(category.map(Category::aspect)).unwrap_or(Aspect::Happy);
            Some(CoverageSeed {
                group: str_field(s, &["group", "section"]).unwrap_or_default(),
                title,
                aspect,
                category: seed_category(aspect, category),
                state: str_field(s, &["state", "status"])
                    .and_then(|v| SeedState::parse(&v))
                    .unwrap_or_default(),
                analysis_ids: list_field(
                    s,
                    &["analysis_ids", "analysis_id", "refs", "ref", "item_ids", "item_id"],
                ),
                checks: list_field(s, &["checks", "check"]),
                expected: list_field(s, &["expected", "expected_results", "expected_result"]),
                hints: list_field(s, &["hints", "hint", "notes"]),
                reference_column: str_field(s, &["reference_column", "column"]),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ir_with;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sectioned_payload_gets_canonical_ids() {
        let value = json!({"sections": [
            {"name": "Login", "items": [
                {"id": "x", "title": "Valid OTP", "requirement_ids": ["FLOW-001", "NOPE-9"]},
                {"title": "Expired OTP", "checks": "Wait 5 minutes"}
            ]},
            {"name": "Audit", "items": ["Login attempts are recorded"]}
        ]});
        let items = AnalysisPayload::from_value(&value).into_items(&ir_with(&["FLOW-001"]));
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["001.001", "001.002", "002.001"]);
        assert_eq!(items[0].requirement_ids, vec!["FLOW-001"]);
        assert_eq!(items[1].checks, vec!["Wait 5 minutes"]);
        assert_eq!(items[2].title, "Login attempts are recorded");
    }

    #[test]
    fn flat_payload_groups_by_section_field() {
        let value = json!({"items": [
            {"section": "A", "title": "one"},
            {"section": "B", "title": "two"},
            {"section": "a", "title": "three"},
            {"title": "untitled section"},
            {"section": "A"}
        ]});
        let items = AnalysisPayload::from_value(&value).into_items(&ir_with(&[]));
        let view: Vec<_> = items.iter().map(|i| (i.id.as_str(), i.section.as_str())).collect();
        assert_eq!(
            view,
            vec![("001.001", "A"), ("001.002", "A"), ("002.001", "B"), ("003.001", "General")]
        );
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert_eq!(AnalysisPayload::from_value(&json!({"foo": 1})), AnalysisPayload::Empty);
        assert!(AnalysisPayload::Empty.into_items(&ir_with(&[])).is_empty());
    }

    #[test]
    fn seed_defaults_follow_aspect() {
        let seeds = seeds_from_value(&json!({"seeds": [
            {"title": "Expired", "aspect": "negative", "analysis_id": "001.002"},
            {"title": "Long input", "category": "boundary"},
            {"group": "no title"}
        ]}));
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].aspect, Aspect::Error);
        assert_eq!(seeds[0].category, Category::Negative);
        assert_eq!(seeds[0].analysis_ids, vec!["001.002"]);
        assert_eq!(seeds[1].aspect, Aspect::Edge);
        assert_eq!(seeds[1].state, SeedState::Ok);
    }

    #[test]
    fn stated_category_cannot_contradict_aspect() {
        let seeds = seeds_from_value(&json!({"seeds": [
            {"title": "Wrong OTP", "aspect": "error", "category": "happy"},
            {"title": "Guest opens admin page", "aspect": "permission", "category": "boundary"},
            {"title": "Sixth attempt", "aspect": "happy", "category": "boundary"},
            {"title": "Valid OTP", "aspect": "happy", "category": "happy"}
        ]}));
        let view: Vec<_> = seeds.iter().map(|s| (s.aspect, s.category)).collect();
        assert_eq!(
            view,
            vec![
                (Aspect::Error, Category::Negative),
                (Aspect::Permission, Category::Negative),
                (Aspect::Happy, Category::Boundary),
                (Aspect::Happy, Category::Happy),
            ]
        );
    }
}
