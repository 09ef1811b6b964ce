//! Error types for contract parsing
//!
//! A contract failure means the model text never reduced to valid JSON,
//! or reduced to JSON of the wrong shape.

/// Errors raised while turning model text into a JSON value
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// Input was empty or whitespace only
    #[error("empty model response")]
    Empty,

    /// No candidate parsed through any repair variant
    #[error("no parseable JSON after {attempts} attempts: {last_error} (excerpt: {excerpt:?})")]
    Unparseable {
        /// Number of candidate/variant combinations tried
        attempts: usize,
        /// Parser message from the last attempt
        last_error: String,
        /// Leading slice of the input, for logs
        excerpt: String,
    },

    /// Parsed value was not a JSON object
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead
        found: &'static str,
    },

    /// Parsed value did not match the requested shape
    #[error("payload shape mismatch: {0}")]
    Shape(#[source] serde_json::Error),
}

impl ContractError {
    /// Whether the failure came from an empty body rather than bad syntax
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Result alias for contract operations
pub type ContractResult<T> = Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_display() {
        assert_eq!(ContractError::Empty.to_string(), "empty model response");
        assert!(ContractError::Empty.is_empty());
    }

    #[test]
    fn unparseable_display_contains_excerpt() {
        let err = ContractError::Unparseable {
            attempts: 8,
            last_error: "EOF".to_string(),
            excerpt: "{\"a\"".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("8 attempts"));
        assert!(msg.contains("EOF"));
        assert!(!err.is_empty());
    }
}
