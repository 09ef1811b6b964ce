//! Coverage completeness gate

use crate::analysis::{sections, AnalysisItem, Aspect, CoverageSeed};
use serde::{Deserialize, Serialize};

/// What normalized seeds fail to cover
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    /// Items no seed refers to
    pub missing_ids: Vec<String>,
    /// Sections with no seed
    pub missing_sections: Vec<String>,
    /// Aspects no seed exercises
    pub missing_aspects: Vec<Aspect>,
}

impl CoverageGap {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_ids.is_empty() && self.missing_sections.is_empty() && self.missing_aspects.is_empty()
    }
}

impl std::fmt::Display for CoverageGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let aspects: Vec<&str> = self.missing_aspects.iter().map(|a| a.as_str()).collect();
        write!(
            f,
            "missing ids [{}], sections [{}], aspects [{}]",
            self.missing_ids.join(", "),
            self.missing_sections.join(", "),
            aspects.join(", ")
        )
    }
}

/// Compare normalized seeds against the items they must cover.
///
/// Every item id must be referenced, every section must hold a seed and
/// every [`Aspect`] must appear at least once.
#[must_use]
pub fn check_coverage(items: &[AnalysisItem], seeds: &[CoverageSeed]) -> CoverageGap {
    let missing_ids = items
        .iter()
        .filter(|item| !seeds.iter().any(|s| s.analysis_ids.iter().any(|id| *id == item.id)))
        .map(|item| item.id.clone())
        .collect();

    let missing_sections = sections(items)
        .into_iter()
        .filter(|section| !seeds.iter().any(|s| s.group.trim().eq_ignore_ascii_case(section.trim())))
        .map(str::to_string)
        .collect();

    let missing_aspects = Aspect::ALL
        .into_iter()
        .filter(|aspect| !seeds.iter().any(|s| s.aspect == *aspect))
        .collect();

    CoverageGap {
        missing_ids,
        missing_sections,
        missing_aspects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::item;
    use pretty_assertions::assert_eq;

    #[test]
    fn gaps_are_reported_per_dimension() {
        let items = vec![item(1, 1, "Login", "Valid OTP"), item(2, 1, "Audit", "Attempts")];
        let mut seed = CoverageSeed::for_item(&items[0], Aspect::Happy);
        seed.group = "login".into();
        let gap = check_coverage(&items, &[seed]);
        assert_eq!(gap.missing_ids, vec!["002.001"]);
        assert_eq!(gap.missing_sections, vec!["Audit"]);
        assert_eq!(gap.missing_aspects, vec![Aspect::Edge, Aspect::Error, Aspect::Permission]);
        assert!(!gap.is_complete());
    }

    #[test]
    fn full_coverage_is_complete() {
        let items = vec![item(1, 1, "Login", "Valid OTP")];
        let seeds: Vec<_> = Aspect::ALL.into_iter().map(|a| CoverageSeed::for_item(&items[0], a)).collect();
        assert!(check_coverage(&items, &seeds).is_complete());
    }
}
