//! Contract parser
//!
//! Tries every candidate (see [`crate::scan`]) against every repair
//! combination (see [`crate::repair`]); the first variant that parses wins.

use crate::error::{ContractError, ContractResult};
use crate::repair::RepairSet;
use crate::scan::{candidates, CandidateKind};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Length of the input excerpt kept in errors
const EXCERPT_LEN: usize = 160;

/// A successfully parsed contract payload
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContract {
    /// Parsed JSON value
    pub value: Value,
    /// Which candidate produced it
    pub candidate: CandidateKind,
    /// Which repairs were needed
    pub repairs: RepairSet,
}

impl ParsedContract {
    /// Whether the text parsed without extraction or repair
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.candidate == CandidateKind::Raw && self.repairs.is_empty()
    }
}

/// Stateless parser for model output
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractParser;

impl ContractParser {
    /// Create new contract parser
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse any JSON value out of `text`.
    ///
    /// # Errors
    /// - [`ContractError::Empty`] for blank input
    /// - [`ContractError::Unparseable`] when no variant parses
    pub fn parse(&self, text: &str) -> ContractResult<ParsedContract> {
        if text.trim().is_empty() {
            return Err(ContractError::Empty);
        }

        let mut attempts = 0;
        let mut last_error = String::new();

        for (kind, candidate) in candidates(text) {
            for repairs in RepairSet::combinations() {
                attempts += 1;
                let variant = if repairs.is_empty() {
                    std::borrow::Cow::Borrowed(candidate)
                } else {
                    std::borrow::Cow::Owned(repairs.apply(candidate))
                };
                match serde_json::from_str::<Value>(&variant) {
                    Ok(value) => {
                        if !repairs.is_empty() || kind != CandidateKind::Raw {
                            tracing::debug!(
                                candidate = ?kind,
                                repairs = %repairs,
                                "contract parsed after recovery"
                            );
                        }
                        return Ok(ParsedContract {
                            value,
                            candidate: kind,
                            repairs,
                        });
                    }
                    Err(e) => last_error = e.to_string(),
                }
            }
        }

        Err(ContractError::Unparseable {
            attempts,
            last_error,
            excerpt: text.chars().take(EXCERPT_LEN).collect(),
        })
    }

    /// Parse and require a JSON object.
    ///
    /// # Errors
    /// As [`ContractParser::parse`], plus [`ContractError::NotAnObject`].
    pub fn parse_object(&self, text: &str) -> ContractResult<ParsedContract> {
        let parsed = self.parse(text)?;
        if parsed.value.is_object() {
            Ok(parsed)
        } else {
            Err(ContractError::NotAnObject {
                found: json_type_name(&parsed.value),
            })
        }
    }

    /// Parse and deserialize into `T`.
    ///
    /// # Errors
    /// As [`ContractParser::parse`], plus [`ContractError::Shape`].
    pub fn parse_as<T: DeserializeOwned>(&self, text: &str) -> ContractResult<T> {
        let parsed = self.parse(text)?;
        serde_json::from_value(parsed.value).map_err(ContractError::Shape)
    }
}

/// Convenience wrapper around [`ContractParser::parse`] returning the value.
///
/// # Errors
/// See [`ContractParser::parse`].
pub fn parse_contract(text: &str) -> ContractResult<Value> {
    ContractParser.parse(text).map(|p| p.value)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn clean_json_is_clean() {
        let parsed = ContractParser.parse(r#"{"a": 1}"#).unwrap();
        assert!(parsed.is_clean());
        assert_eq!(parsed.value, json!({"a": 1}));
    }

    #[test]
    fn prose_and_fence() {
        let text = "Sure! Here is the result.\n```json\n{\"items\": [1, 2]}\n```\nLet me know.";
        let parsed = ContractParser.parse(text).unwrap();
        assert_eq!(parsed.candidate, CandidateKind::Fenced);
        assert_eq!(parsed.value, json!({"items": [1, 2]}));
    }

    #[test]
    fn prose_without_fence_uses_scanner() {
        let text = "The answer is {\"ok\": true} as requested.";
        let parsed = ContractParser.parse(text).unwrap();
        assert_eq!(parsed.candidate, CandidateKind::Balanced);
        assert_eq!(parsed.value, json!({"ok": true}));
    }

    #[test]
    fn combined_repairs() {
        let text = "```json\n{\"title\": \"a\nb\" \"steps\": [\"x\", \"y\",],}\n```";
        let parsed = ContractParser.parse(text).unwrap();
        assert_eq!(parsed.value, json!({"title": "a\nb", "steps": ["x", "y"]}));
        assert!(parsed.repairs.contains(RepairSet::ESCAPE_NEWLINES));
        assert!(parsed.repairs.contains(RepairSet::INSERT_COMMAS));
    }

    #[test]
    fn empty_input() {
        assert!(matches!(ContractParser.parse("  \n "), Err(ContractError::Empty)));
    }

    #[test]
    fn truncated_input_fails() {
        let err = ContractParser.parse(r#"{"cases": [{"title": "x""#).unwrap_err();
        assert!(matches!(err, ContractError::Unparseable { .. }));
    }

    #[test]
    fn parse_object_rejects_arrays() {
        let err = ContractParser.parse_object("[1, 2]").unwrap_err();
        assert!(matches!(err, ContractError::NotAnObject { found: "array" }));
    }

    #[test]
    fn parse_as_reports_shape_errors() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            count: u32,
        }
        let err = ContractParser.parse_as::<Shape>(r#"{"count": "many"}"#).unwrap_err();
        assert!(matches!(err, ContractError::Shape(_)));
    }
}
