//! Requirement IR builder
//!
//! Model extraction when enabled, normalized against the chunk index;
//! keyword classification of the requirement text otherwise, or when
//! extraction fails.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ir::markdown::MarkdownScan;
use crate::ir::normalize::{coverage_map, has_claims, normalize_claims, number_claims, scenarios};
use crate::ir::{
    Chunk, ChunkKind, Citation, Claim, ClaimKind, FixedSide, IrSource, ReferenceColumn,
    RequirementIr, TicketSources,
};
use crate::keywords::Keywords;
use crate::llm::{prompts, CallTrace, ContractCaller, Stage};
use crate::report::FallbackEvent;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Built IR plus what happened on the way
#[derive(Debug, Clone)]
pub struct IrBuild {
    pub ir: RequirementIr,
    pub events: Vec<FallbackEvent>,
    pub trace: Option<CallTrace>,
}

/// Builds a [`RequirementIr`] from ticket sources and requirement text
pub struct IrBuilder<'a> {
    config: &'a PipelineConfig,
    keywords: &'a Keywords,
    caller: Option<&'a ContractCaller<'a>>,
}

impl std::fmt::Debug for IrBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrBuilder")
            .field("model", &self.caller.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> IrBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a PipelineConfig, keywords: &'a Keywords) -> Self {
        Self {
            config,
            keywords,
            caller: None,
        }
    }

    /// Builder: extract claims with the model
    #[inline]
    #[must_use]
    pub fn with_caller(mut self, caller: &'a ContractCaller<'a>) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Build the IR.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] for an empty requirement. Extraction
    /// failures fall back to the deterministic IR and are not errors.
    pub async fn build(&self, sources: &TicketSources, requirement: &str) -> PipelineResult<IrBuild> {
        if requirement.trim().is_empty() {
            return Err(PipelineError::validation("requirement text is empty"));
        }
        let scan = MarkdownScan::parse(requirement);
        let chunks = sources.chunks(&scan);
        let columns = scan.reference_columns();

        let mut events = Vec::new();
        let mut trace = None;
        let extracted = match self.caller.filter(|_| self.config.ir.llm_extraction) {
            None => Err("model extraction disabled".to_string()),
            Some(caller) => {
                let prompt = prompts::ir_extraction(&chunk_index(&chunks));
                match caller.call_json(Stage::IrExtraction, &prompt, None).await {
                    Ok(reply) => {
                        events.extend(reply.trace.events());
                        trace = Some(reply.trace);
                        if has_claims(&reply.value) {
                            Ok(normalize_claims(&chunks, &reply.value))
                        } else {
                            Err("extraction returned no claims".to_string())
                        }
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        let (source, claims) = match extracted {
            Ok(claims) => (IrSource::Model, claims),
            Err(reason) => {
                tracing::warn!(ticket = %sources.meta.key, %reason, "using deterministic IR");
                events.push(FallbackEvent::DeterministicIr { reason });
                (IrSource::Deterministic, self.deterministic_claims(&chunks, &columns))
            }
        };

        let ir = RequirementIr {
            meta: sources.meta.clone(),
            source,
            coverage: coverage_map(&chunks, &claims),
            scenarios: scenarios(&claims),
            chunks,
            claims,
            tables: scan.tables,
            reference_columns: columns,
            format_markers: scan.markers,
        };
        let (covered, ignored) = ir.coverage_counts();
        tracing::info!(ticket = %ir.meta.key, claims = ir.claims.len(), covered, ignored, source = ?ir.source, "requirement IR built");
        Ok(IrBuild { ir, events, trace })
    }

    /// Classify requirement sentences by keyword family
    #[must_use]
    pub fn deterministic_claims(&self, chunks: &[Chunk], columns: &[ReferenceColumn]) -> Vec<Claim> {
        let kw = self.keywords;
        let mut buckets: HashMap<ClaimKind, Vec<(String, Citation)>> = HashMap::new();
        let mut push = |kind: ClaimKind, text: String, citation: Citation| {
            buckets.entry(kind).or_default().push((text, citation));
        };

        let has_paragraphs = chunks.iter().any(|c| c.kind == ChunkKind::Paragraph);
        let sources = chunks.iter().filter(|c| {
            if has_paragraphs {
                c.kind == ChunkKind::Paragraph
            } else {
                matches!(c.kind, ChunkKind::Description | ChunkKind::AcceptanceCriteria)
            }
        });

        let mut actors: Vec<String> = Vec::new();
        for chunk in sources {
            for sentence in &chunk.sentences {
                let text = sentence.text.trim();
                let citation = Citation {
                    chunk_id: chunk.id.clone(),
                    sentence_ids: vec![sentence.index],
                    quote: sentence.text.clone(),
                };
                for actor in kw.actors.found(text) {
                    if !actors.contains(&actor) {
                        push(ClaimKind::Actor, capitalize(&actor), citation.clone());
                        actors.push(actor);
                    }
                }
                let kind = if text.ends_with('?') || text.ends_with('？') {
                    Some(ClaimKind::OpenQuestion)
                } else if kw.out_of_scope.matches(text) {
                    Some(ClaimKind::OutOfScope)
                } else if kw.non_functional.matches(text) {
                    Some(ClaimKind::NonFunctional)
                } else if kw.rules.matches(text) {
                    Some(ClaimKind::Rule)
                } else if text.split_whitespace().count() >= 3 {
                    Some(ClaimKind::Flow)
                } else {
                    None
                };
                if kw.vague.matches(text) {
                    push(ClaimKind::Ambiguity, text.to_string(), citation.clone());
                }
                if let Some(kind) = kind {
                    push(kind, text.to_string(), citation);
                }
            }
        }

        for column in columns {
            let citation = Citation {
                chunk_id: column.chunk_id.clone(),
                sentence_ids: vec![column.row],
                quote: chunks
                    .iter()
                    .find(|c| c.id == column.chunk_id)
                    .and_then(|c| c.sentence(column.row))
                    .map(|s| s.text.clone())
                    .unwrap_or_default(),
            };
            push(ClaimKind::Entity, format!("Column {}", column.name), citation.clone());
            push(ClaimKind::Rule, describe_column(column), citation);
        }

        ClaimKind::ALL
            .iter()
            .flat_map(|kind| number_claims(*kind, buckets.remove(kind).unwrap_or_default()))
            .collect()
    }
}

/// Chunk index as sent to the extraction prompt
fn chunk_index(chunks: &[Chunk]) -> Value {
    Value::Array(
        chunks
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "sentences": c.sentences.iter().map(|s| &s.text).collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

/// One-line summary of a column's flags
#[must_use]
pub fn describe_column(column: &ReferenceColumn) -> String {
    let mut parts = Vec::new();
    if column.is_new {
        parts.push("new column".to_string());
    }
    parts.push(if column.sortable { "sortable" } else { "not sortable" }.to_string());
    match column.fixed {
        FixedSide::Left => parts.push("fixed left".to_string()),
        FixedSide::Right => parts.push("fixed right".to_string()),
        FixedSide::None => {}
    }
    if let Some(rules) = &column.format_rules {
        parts.push(format!("format {rules}"));
    }
    if let Some(param) = &column.cross_page_parameter {
        parts.push(format!("cross-page parameter {param}"));
    }
    if let Some(note) = &column.edit_note {
        parts.push(format!("edit note: {note}"));
    }
    format!("Column {}: {}", column.name, parts.join(", "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
