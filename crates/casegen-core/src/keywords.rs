//! Keyword matching
//!
//! Every vocabulary in [`KeywordConfig`] compiles to one case-insensitive
//! alternation of whole words, longest keyword first. A trailing `*` turns
//! a keyword into a prefix: `unauthori*` matches `unauthorized`.

use crate::analysis::Category;
use crate::config::KeywordConfig;
use crate::error::{PipelineError, PipelineResult};
use regex::Regex;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Word-anchored pattern for one keyword
fn pattern(word: &str) -> String {
    let (stem, prefix) = match word.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (word, false),
    };
    let mut out = String::new();
    if stem.starts_with(is_word_char) {
        out.push_str(r"\b");
    }
    out.push_str(&regex::escape(stem));
    if prefix {
        out.push_str(r"\w*");
    }
    if prefix || stem.ends_with(is_word_char) {
        out.push_str(r"\b");
    }
    out
}

/// One compiled vocabulary
#[derive(Debug, Clone)]
pub struct KeywordSet {
    regex: Option<Regex>,
}

impl KeywordSet {
    /// Compile `words`; an empty list matches nothing
    ///
    /// # Errors
    /// [`PipelineError::Config`] if the alternation fails to compile.
    pub fn new(words: &[String]) -> PipelineResult<Self> {
        let mut words: Vec<&str> = words.iter().map(|w| w.trim()).filter(|w| !w.is_empty()).collect();
        if words.is_empty() {
            return Ok(Self { regex: None });
        }
        words.sort_by_key(|w| std::cmp::Reverse(w.len()));
        let alternation = words.iter().map(|w| pattern(w)).collect::<Vec<_>>().join("|");
        let regex = Regex::new(&format!("(?i)(?:{alternation})"))
            .map_err(|e| PipelineError::Config(format!("keyword list: {e}")))?;
        Ok(Self { regex: Some(regex) })
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }

    /// Distinct matched keywords, lowercased, in order of appearance
    #[must_use]
    pub fn found(&self, text: &str) -> Vec<String> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for m in regex.find_iter(text) {
            let word = m.as_str().to_lowercase();
            if !out.contains(&word) {
                out.push(word);
            }
        }
        out
    }
}

/// All compiled vocabularies
#[derive(Debug, Clone)]
pub struct Keywords {
    pub negative: KeywordSet,
    pub boundary: KeywordSet,
    pub permission: KeywordSet,
    pub actors: KeywordSet,
    pub rules: KeywordSet,
    pub non_functional: KeywordSet,
    pub out_of_scope: KeywordSet,
    pub vague: KeywordSet,
}

impl Keywords {
    /// # Errors
    /// See [`KeywordSet::new`].
    pub fn from_config(config: &KeywordConfig) -> PipelineResult<Self> {
        Ok(Self {
            negative: KeywordSet::new(&config.negative)?,
            boundary: KeywordSet::new(&config.boundary)?,
            permission: KeywordSet::new(&config.permission)?,
            actors: KeywordSet::new(&config.actors)?,
            rules: KeywordSet::new(&config.rules)?,
            non_functional: KeywordSet::new(&config.non_functional)?,
            out_of_scope: KeywordSet::new(&config.out_of_scope)?,
            vague: KeywordSet::new(&config.vague)?,
        })
    }

    /// Non-happy category suggested by `evidence`, negative first
    #[must_use]
    pub fn category_of(&self, evidence: &str) -> Option<Category> {
        if self.negative.matches(evidence) {
            Some(Category::Negative)
        } else if self.boundary.matches(evidence) {
            Some(Category::Boundary)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Keywords {
        Keywords::from_config(&KeywordConfig::default()).unwrap()
    }

    #[test]
    fn whole_word_matching() {
        let kw = keywords();
        assert!(kw.negative.matches("OTP expires after 5 minutes"));
        assert!(!kw.negative.matches("experience"));
        assert_eq!(kw.category_of("Summary email is sent within 5 minutes"), None);
        assert_eq!(kw.category_of("Maximize the window"), None);
        assert!(!kw.vague.matches("Something is shown"));
        assert!(kw.vague.matches("Show some rows, etc."));
        assert_eq!(kw.category_of("Password longer than the maximum"), Some(Category::Boundary));
        assert_eq!(kw.category_of("Invalid OTP over the limit"), Some(Category::Negative));
        assert_eq!(kw.category_of("User logs in"), None);
    }

    #[test]
    fn found_prefers_longest_keyword() {
        let kw = keywords();
        assert_eq!(kw.actors.found("The administrator and a user"), vec!["administrator", "user"]);
    }

    #[test]
    fn star_marks_a_prefix() {
        let kw = keywords();
        assert!(kw.negative.matches("Unauthorized request"));
        assert!(kw.permission.matches("User authenticates with OTP"));
        let set = KeywordSet::new(&["rest".to_string(), "sort*".to_string()]).unwrap();
        assert!(!set.matches("Restore the backup"));
        assert!(set.matches("REST endpoint"));
        assert_eq!(set.found("Sorted and sorting"), vec!["sorted", "sorting"]);
    }

    #[test]
    fn empty_list_matches_nothing() {
        let set = KeywordSet::new(&[]).unwrap();
        assert!(!set.matches("anything"));
        assert!(set.found("anything").is_empty());
    }
}
