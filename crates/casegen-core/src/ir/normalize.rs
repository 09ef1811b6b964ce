//! Claim normalization against the chunk index
//!
//! Extraction output is untrusted: citations may point past the end of a
//! chunk, name chunks that do not exist, or be missing. Every claim leaves
//! here with a citation that resolves.

use crate::ir::{Chunk, Citation, Claim, ClaimKind, SentenceCoverage, SentenceStatus};
use crate::payload::{index_field, str_field};
use serde_json::Value;
use std::collections::HashSet;

/// Claim as it arrived from the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawClaim {
    pub text: String,
    pub chunk_id: Option<String>,
    pub sentence_ids: Vec<usize>,
    pub quote: Option<String>,
}

impl RawClaim {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

fn payload_keys(kind: ClaimKind) -> &'static [&'static str] {
    match kind {
        ClaimKind::Actor => &["actors"],
        ClaimKind::Entity => &["entities"],
        ClaimKind::Flow => &["flows", "scenarios"],
        ClaimKind::Rule => &["rules", "business_rules"],
        ClaimKind::NonFunctional => &["non_functional", "nfr", "nfrs"],
        ClaimKind::OutOfScope => &["out_of_scope", "oos"],
        ClaimKind::OpenQuestion => &["open_questions", "questions"],
        ClaimKind::Ambiguity => &["ambiguities"],
    }
}

/// Raw claims of one kind from an extraction payload
#[must_use]
pub fn raw_claims(payload: &Value, kind: ClaimKind) -> Vec<RawClaim> {
    let Some(items) = payload_keys(kind)
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array))
    else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(RawClaim::text(s.trim())),
            Value::Object(_) => {
                let text = str_field(item, &["text", "name", "description", "claim"])?;
                let cite = ["citation", "source", "cite"]
                    .iter()
                    .find_map(|k| item.get(*k).filter(|v| v.is_object()))
                    .unwrap_or(item);
                Some(RawClaim {
                    text,
                    chunk_id: str_field(cite, &["chunk_id", "chunk"]),
                    sentence_ids: index_field(cite, &["sentence_ids", "sentences", "sentence_id"]),
                    quote: str_field(cite, &["quote"]),
                })
            }
            _ => None,
        })
        .collect()
}

/// Fallback citation: first sentence of the description chunk
#[must_use]
pub fn default_citation(chunks: &[Chunk]) -> Citation {
    let chunk = chunks
        .iter()
        .find(|c| c.id == "desc" && !c.sentences.is_empty())
        .or_else(|| chunks.iter().find(|c| !c.sentences.is_empty()));
    match chunk {
        Some(chunk) => Citation {
            chunk_id: chunk.id.clone(),
            sentence_ids: vec![0],
            quote: chunk.sentences[0].text.clone(),
        },
        None => Citation {
            chunk_id: "desc".to_string(),
            sentence_ids: Vec::new(),
            quote: String::new(),
        },
    }
}

fn cited(chunks: &[Chunk], raw: &RawClaim) -> Option<Citation> {
    let chunk = chunks.iter().find(|c| Some(&c.id) == raw.chunk_id.as_ref())?;
    let mut ids: Vec<usize> = raw
        .sentence_ids
        .iter()
        .copied()
        .filter(|&i| i < chunk.sentences.len())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return None;
    }
    let quote = raw.quote.clone().unwrap_or_else(|| {
        ids.iter()
            .map(|&i| chunk.sentences[i].text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });
    Some(Citation {
        chunk_id: chunk.id.clone(),
        sentence_ids: ids,
        quote,
    })
}

fn matched(chunks: &[Chunk], raw: &RawClaim) -> Option<Citation> {
    let needles: Vec<String> = [raw.quote.as_deref(), Some(raw.text.as_str())]
        .into_iter()
        .flatten()
        .map(|s| s.trim().trim_end_matches(['.', '!', '?']).to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let hit = |pred: &dyn Fn(&str, &str) -> bool| {
        chunks.iter().find_map(|chunk| {
            chunk.sentences.iter().find_map(|s| {
                let hay = s.text.to_lowercase();
                needles.iter().any(|n| pred(hay.as_str(), n.as_str())).then(|| Citation {
                    chunk_id: chunk.id.clone(),
                    sentence_ids: vec![s.index],
                    quote: s.text.clone(),
                })
            })
        })
    };

    hit(&|hay, needle| hay.contains(needle)).or_else(|| {
        hit(&|hay, needle| {
            let hay = hay.trim_end_matches(['.', '!', '?', '。']);
            hay.len() >= 8 && needle.contains(hay)
        })
    })
}

/// Resolve a citation: model citation, else substring match, else default
#[must_use]
pub fn resolve_citation(chunks: &[Chunk], raw: &RawClaim) -> Citation {
    cited(chunks, raw)
        .or_else(|| matched(chunks, raw))
        .unwrap_or_else(|| default_citation(chunks))
}

/// Normalize an extraction payload into claims with kind-prefixed ids
#[must_use]
pub fn normalize_claims(chunks: &[Chunk], payload: &Value) -> Vec<Claim> {
    let mut claims = Vec::new();
    for kind in ClaimKind::ALL {
        let mut seen = HashSet::new();
        for raw in raw_claims(payload, kind) {
            if !seen.insert(raw.text.to_lowercase()) {
                continue;
            }
            let citation = resolve_citation(chunks, &raw);
            claims.push(Claim {
                id: format!("{}-{:03}", kind.prefix(), seen.len()),
                kind,
                text: raw.text,
                citation,
            });
        }
    }
    claims
}

/// Assemble claims of one kind from already-resolved citations
#[must_use]
pub fn number_claims(kind: ClaimKind, cited: Vec<(String, Citation)>) -> Vec<Claim> {
    cited
        .into_iter()
        .enumerate()
        .map(|(i, (text, citation))| Claim {
            id: format!("{}-{:03}", kind.prefix(), i + 1),
            kind,
            text,
            citation,
        })
        .collect()
}

/// Covered/ignored status for every sentence
#[must_use]
pub fn coverage_map(chunks: &[Chunk], claims: &[Claim]) -> Vec<SentenceCoverage> {
    let covered: HashSet<(&str, usize)> = claims
        .iter()
        .flat_map(|c| {
            c.citation
                .sentence_ids
                .iter()
                .map(move |&i| (c.citation.chunk_id.as_str(), i))
        })
        .collect();
    chunks
        .iter()
        .flat_map(|chunk| {
            let covered = &covered;
            chunk.sentences.iter().map(move |s| SentenceCoverage {
                chunk_id: chunk.id.clone(),
                sentence_id: s.index,
                status: if covered.contains(&(chunk.id.as_str(), s.index)) {
                    SentenceStatus::Covered
                } else {
                    SentenceStatus::Ignored
                },
            })
        })
        .collect()
}

/// Flow texts for the scenario list
#[must_use]
pub fn scenarios(claims: &[Claim]) -> Vec<String> {
    claims
        .iter()
        .filter(|c| c.kind == ClaimKind::Flow)
        .map(|c| c.text.clone())
        .collect()
}

/// Whether a payload holds any claim array at all
#[must_use]
pub fn has_claims(payload: &Value) -> bool {
    ClaimKind::ALL
        .iter()
        .flat_map(|k| payload_keys(*k))
        .any(|key| payload.get(*key).and_then(Value::as_array).is_some_and(|a| !a.is_empty()))
}
