//! Syntax repairs for almost-JSON
//!
//! Each repair is a single left-to-right pass that tracks string/escape
//! state. Comma insertion keeps an explicit stack of frames, one per open
//! bracket, so nesting depth never turns into recursion.

/// A set of repairs applied to one candidate, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairSet(u8);

impl RepairSet {
    /// Escape raw newlines/tabs inside string literals
    pub const ESCAPE_NEWLINES: Self = Self(0b001);
    /// Drop commas directly before a closing bracket
    pub const STRIP_TRAILING_COMMAS: Self = Self(0b010);
    /// Insert commas between adjacent members/items
    pub const INSERT_COMMAS: Self = Self(0b100);

    /// No repairs
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// All eight combinations, cheapest first
    #[must_use]
    pub fn combinations() -> [Self; 8] {
        [0, 1, 2, 4, 3, 5, 6, 7].map(Self)
    }

    /// Whether `other` is contained in this set
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no repair is selected
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Apply the selected repairs in a fixed order.
    #[must_use]
    pub fn apply(self, text: &str) -> String {
        let mut out = text.to_string();
        if self.contains(Self::ESCAPE_NEWLINES) {
            out = escape_string_newlines(&out);
        }
        if self.contains(Self::STRIP_TRAILING_COMMAS) {
            out = strip_trailing_commas(&out);
        }
        if self.contains(Self::INSERT_COMMAS) {
            out = insert_missing_commas(&out);
        }
        out
    }
}

impl std::fmt::Display for RepairSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::ESCAPE_NEWLINES) {
            names.push("escape-newlines");
        }
        if self.contains(Self::STRIP_TRAILING_COMMAS) {
            names.push("strip-trailing-commas");
        }
        if self.contains(Self::INSERT_COMMAS) {
            names.push("insert-commas");
        }
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}

/// Escape literal control whitespace found inside string literals.
#[must_use]
pub fn escape_string_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }
        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Remove commas that are followed (after whitespace) by `}` or `]`.
#[must_use]
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// What the innermost open container expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    expect: Expect,
}

/// Token classes the cursor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    String,
    Scalar,
    Container,
}

/// Insert commas where a value or key starts while a comma was expected.
///
/// Only inserts where the result is unambiguous: between two array items,
/// or before a string key that follows a complete member.
#[must_use]
pub fn insert_missing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let start = match ch {
            '"' => Some(Start::String),
            '{' | '[' => Some(Start::Container),
            c if c == '-' || c.is_ascii_digit() || c.is_ascii_alphabetic() => Some(Start::Scalar),
            _ => None,
        };

        if let Some(start) = start {
            if let Some(frame) = stack.last_mut() {
                if frame.expect == Expect::Comma {
                    let insert = match frame.kind {
                        FrameKind::Array => true,
                        FrameKind::Object => start == Start::String,
                    };
                    if insert {
                        out.push(',');
                        frame.expect = match frame.kind {
                            FrameKind::Array => Expect::Value,
                            FrameKind::Object => Expect::Key,
                        };
                    }
                }
                frame.expect = match (frame.kind, frame.expect) {
                    (FrameKind::Object, Expect::Key) if start == Start::String => Expect::Colon,
                    (_, Expect::Value) => Expect::Comma,
                    (_, other) => other,
                };
            }
        }

        match start {
            Some(Start::String) => {
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            Some(Start::Scalar) => {
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-'))
                {
                    out.push(chars[i]);
                    i += 1;
                }
                continue;
            }
            Some(Start::Container) => {
                stack.push(if ch == '{' {
                    Frame { kind: FrameKind::Object, expect: Expect::Key }
                } else {
                    Frame { kind: FrameKind::Array, expect: Expect::Value }
                });
            }
            None => match ch {
                '}' | ']' => {
                    stack.pop();
                }
                ':' => {
                    if let Some(frame) = stack.last_mut() {
                        if frame.expect == Expect::Colon {
                            frame.expect = Expect::Value;
                        }
                    }
                }
                ',' => {
                    if let Some(frame) = stack.last_mut() {
                        frame.expect = match frame.kind {
                            FrameKind::Object => Expect::Key,
                            FrameKind::Array => Expect::Value,
                        };
                    }
                }
                _ => {}
            },
        }
        out.push(ch);
        i += 1;
    }
    out
}

/// Copy a string literal starting at `start` (the opening quote) and return
/// the index just past its closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push(chars[start]);
    let mut i = start + 1;
    let mut escaped = false;
    while i < chars.len() {
        let ch = chars[i];
        out.push(ch);
        i += 1;
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            break;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(s: &str) -> serde_json::Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn escapes_newline_only_inside_strings() {
        let text = "{\n\"a\": \"line one\nline two\"\n}";
        let fixed = escape_string_newlines(text);
        assert_eq!(parse(&fixed), json!({"a": "line one\nline two"}));
    }

    #[test]
    fn strips_trailing_commas() {
        let fixed = strip_trailing_commas(r#"{"a": [1, 2, ], "b": "x,]", }"#);
        assert_eq!(parse(&fixed), json!({"a": [1, 2], "b": "x,]"}));
    }

    #[test]
    fn inserts_comma_between_members() {
        let fixed = insert_missing_commas("{\"a\": 1\n\"b\": \"two\" \"c\": [1 2 3]}");
        assert_eq!(parse(&fixed), json!({"a": 1, "b": "two", "c": [1, 2, 3]}));
    }

    #[test]
    fn inserts_comma_between_objects_in_array() {
        let fixed = insert_missing_commas(r#"[{"a": 1} {"a": 2}]"#);
        assert_eq!(parse(&fixed), json!([{"a": 1}, {"a": 2}]));
    }

    #[test]
    fn leaves_valid_json_untouched() {
        let text = r#"{"a": {"b": [true, null, -1.5e3]}, "c": "d"}"#;
        assert_eq!(insert_missing_commas(text), text);
        assert_eq!(strip_trailing_commas(text), text);
        assert_eq!(escape_string_newlines(text), text);
    }

    #[test]
    fn repair_set_display() {
        assert_eq!(RepairSet::none().to_string(), "none");
        let all = RepairSet::combinations()[7];
        assert_eq!(
            all.to_string(),
            "escape-newlines+strip-trailing-commas+insert-commas"
        );
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 10_000;
        let text = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
        assert_eq!(insert_missing_commas(&text).len(), depth * 2);
    }
}
