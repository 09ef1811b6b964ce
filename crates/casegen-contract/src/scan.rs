//! Candidate extraction
//!
//! Model text rarely arrives as bare JSON. Candidates are produced in a
//! fixed order: the raw text, the body of an enclosing code fence, and the
//! first balanced bracketed block found by a quote-aware scanner.

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// The trimmed input as-is
    Raw,
    /// Body of a ``` fence
    Fenced,
    /// First balanced `{...}` or `[...]` block
    Balanced,
}

/// Upper bound on opening brackets tried by [`first_balanced_block`].
const MAX_BLOCK_STARTS: usize = 64;

/// Collect candidates in priority order, skipping duplicates.
#[must_use]
pub fn candidates(text: &str) -> Vec<(CandidateKind, &str)> {
    let raw = text.trim().trim_start_matches('\u{feff}');
    let mut out: Vec<(CandidateKind, &str)> = vec![(CandidateKind::Raw, raw)];

    if let Some(fenced) = strip_code_fence(raw) {
        if !out.iter().any(|(_, c)| *c == fenced) {
            out.push((CandidateKind::Fenced, fenced));
        }
    }

    if let Some(block) = first_balanced_block(raw) {
        if !out.iter().any(|(_, c)| *c == block) {
            out.push((CandidateKind::Balanced, block));
        }
    }

    out
}

/// Return the body of the first code fence, if any.
///
/// An unterminated fence (truncated reply) yields everything after the
/// opening line.
#[must_use]
pub fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    // Skip the info string (```json) up to end of line.
    let body_start = after_ticks.find('\n').map_or(after_ticks.len(), |i| i + 1);
    let body = &after_ticks[body_start..];
    let inner = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    let inner = inner.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Find the first balanced bracketed block.
///
/// Brackets inside string literals are ignored; a mismatched closer abandons
/// the current start. At most [`MAX_BLOCK_STARTS`] openers are tried so
/// adversarial input stays linear-ish.
#[must_use]
pub fn first_balanced_block(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut tried = 0;
    let mut pos = 0;
    while pos < bytes.len() && tried < MAX_BLOCK_STARTS {
        let Some(offset) = bytes[pos..].iter().position(|b| *b == b'{' || *b == b'[') else {
            return None;
        };
        let start = pos + offset;
        tried += 1;
        if let Some(end) = scan_block(bytes, start) {
            return Some(&text[start..=end]);
        }
        pos = start + 1;
    }
    None
}

/// Scan from an opener and return the index of its matching closer.
fn scan_block(bytes: &[u8], start: usize) -> Option<usize> {
    let mut closers: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => closers.push(b'}'),
            b'[' => closers.push(b']'),
            b'}' | b']' => {
                if closers.pop() != Some(b) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
