//! Analysis and coverage
//!
//! - [`payload`]: tagged payload variants normalized into canonical items and seeds
//! - [`seeds`]: seed normalization (fan-out, ref resolution, upgrade, dedup)
//! - [`completeness`]: the coverage gate
//! - [`synthesis`]: deterministic analysis and gap-closing seeds
//! - [`generator`]: the stage driver with backfill rounds

pub mod completeness;
pub mod generator;
pub mod payload;
pub mod seeds;
pub mod synthesis;

pub use completeness::{check_coverage, CoverageGap};
pub use generator::{AnalysisGenerator, AnalysisOutcome};
pub use seeds::SeedNormalizer;

use serde::{Deserialize, Serialize};

/// What a seed exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Happy,
    Edge,
    Error,
    Permission,
}

impl Aspect {
    pub const ALL: [Aspect; 4] = [Aspect::Happy, Aspect::Edge, Aspect::Error, Aspect::Permission];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Aspect::Happy => "happy",
            Aspect::Edge => "edge",
            Aspect::Error => "error",
            Aspect::Permission => "permission",
        }
    }

    /// Lenient parse with common synonyms
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "happy" | "positive" | "normal" | "main" => Some(Aspect::Happy),
            "edge" | "boundary" | "limit" | "corner" => Some(Aspect::Edge),
            "error" | "negative" | "failure" | "exception" | "invalid" => Some(Aspect::Error),
            "permission" | "auth" | "authorization" | "access" | "security" | "role" => {
                Some(Aspect::Permission)
            }
            _ => None,
        }
    }

    /// Category implied by the aspect
    #[must_use]
    pub fn category(self) -> Category {
        match self {
            Aspect::Happy => Category::Happy,
            Aspect::Edge => Category::Boundary,
            Aspect::Error | Aspect::Permission => Category::Negative,
        }
    }
}

impl std::fmt::Display for Aspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Happy,
    Negative,
    Boundary,
}

impl Category {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "happy" | "positive" => Some(Category::Happy),
            "negative" | "error" => Some(Category::Negative),
            "boundary" | "edge" => Some(Category::Boundary),
            _ => None,
        }
    }

    /// Aspect a synthesized seed of this category covers
    #[must_use]
    pub fn aspect(self) -> Aspect {
        match self {
            Category::Happy => Aspect::Happy,
            Category::Negative => Aspect::Error,
            Category::Boundary => Aspect::Edge,
        }
    }
}

/// Confidence of a seed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedState {
    #[default]
    Ok,
    /// Built on an assumption the ticket does not state
    Assume,
    /// Needs an answer from the ticket owner
    Ask,
}

impl SeedState {
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "ok" | "confirmed" => Some(SeedState::Ok),
            "assume" | "assumption" | "assumed" => Some(SeedState::Assume),
            "ask" | "question" | "open" => Some(SeedState::Ask),
            _ => None,
        }
    }
}

/// Unit of analysis, id `"SSS.NNN"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisItem {
    pub id: String,
    pub section: String,
    pub title: String,
    pub details: Vec<String>,
    pub checks: Vec<String>,
    pub expected: Vec<String>,
    /// IR claim ids
    pub requirement_ids: Vec<String>,
}

impl AnalysisItem {
    /// Text used for keyword heuristics
    #[must_use]
    pub fn evidence(&self) -> String {
        let mut parts = vec![self.title.as_str()];
        parts.extend(self.details.iter().map(String::as_str));
        parts.extend(self.checks.iter().map(String::as_str));
        parts.extend(self.expected.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Canonical item id
#[must_use]
pub fn item_id(section: usize, item: usize) -> String {
    format!("{section:03}.{item:03}")
}

/// Section names in first-appearance order
#[must_use]
pub fn sections(items: &[AnalysisItem]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !out.contains(&item.section.as_str()) {
            out.push(&item.section);
        }
    }
    out
}

/// A planned test intent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageSeed {
    pub group: String,
    pub title: String,
    pub aspect: Aspect,
    pub category: Category,
    pub state: SeedState,
    /// Exactly one after normalization
    pub analysis_ids: Vec<String>,
    pub checks: Vec<String>,
    pub expected: Vec<String>,
    pub hints: Vec<String>,
    /// Reference column the seed exercises
    pub reference_column: Option<String>,
}

impl CoverageSeed {
    /// Seed for `item` with the aspect's category
    #[must_use]
    pub fn for_item(item: &AnalysisItem, aspect: Aspect) -> Self {
        Self {
            group: item.section.clone(),
            title: item.title.clone(),
            aspect,
            category: aspect.category(),
            state: SeedState::Ok,
            analysis_ids: vec![item.id.clone()],
            checks: item.checks.clone(),
            expected: item.expected.clone(),
            hints: Vec::new(),
            reference_column: None,
        }
    }

    /// The single analysis ref of a normalized seed
    #[must_use]
    pub fn analysis_id(&self) -> Option<&str> {
        self.analysis_ids.first().map(String::as_str)
    }

    /// Text used for keyword heuristics
    #[must_use]
    pub fn evidence(&self) -> String {
        let mut parts = vec![self.title.as_str()];
        parts.extend(self.checks.iter().map(String::as_str));
        parts.extend(self.expected.iter().map(String::as_str));
        parts.extend(self.hints.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Analysis stage output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub items: Vec<AnalysisItem>,
    pub seeds: Vec<CoverageSeed>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_category_mapping() {
        assert_eq!(Aspect::Happy.category(), Category::Happy);
        assert_eq!(Aspect::Edge.category(), Category::Boundary);
        assert_eq!(Aspect::Error.category(), Category::Negative);
        assert_eq!(Aspect::Permission.category(), Category::Negative);
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(Aspect::parse(" Negative "), Some(Aspect::Error));
        assert_eq!(Aspect::parse("boundary"), Some(Aspect::Edge));
        assert_eq!(Category::parse("EDGE"), Some(Category::Boundary));
        assert_eq!(SeedState::parse("assumption"), Some(SeedState::Assume));
        assert_eq!(Aspect::parse("??"), None);
    }

    #[test]
    fn ids_are_zero_padded() {
        assert_eq!(item_id(1, 2), "001.002");
        assert_eq!(item_id(12, 345), "012.345");
    }
}
