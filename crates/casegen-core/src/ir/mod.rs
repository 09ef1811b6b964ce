//! Requirement IR
//!
//! The IR is the traceable, structured form of a ticket:
//! - chunks (description, acceptance criteria, comments, attachments,
//!   links, tables, paragraphs) split into zero-indexed sentences
//! - claims grouped by kind, each citing a chunk and sentence ids
//! - reference-column descriptors and format markers from markdown
//! - a covered/ignored status for every sentence

pub mod builder;
pub mod chunk;
pub mod markdown;
pub mod normalize;

pub use builder::{IrBuild, IrBuilder};
pub use chunk::{split_sentences, AttachmentMeta, CommentSource, LinkRef, TicketSources};
pub use markdown::{parse_checkbox, parse_fixed, MarkdownScan};

use serde::{Deserialize, Serialize};

/// Origin of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Description,
    AcceptanceCriteria,
    Comment,
    Attachment,
    Link,
    Table,
    Paragraph,
}

/// One sentence of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub index: usize,
    pub text: String,
}

/// A citable unit of source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `desc`, `ac`, `comment-N`, `attachment-N`, `link-N`, `table-N`, `para-N`
    pub id: String,
    pub kind: ChunkKind,
    pub sentences: Vec<Sentence>,
}

impl Chunk {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ChunkKind, sentences: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            sentences: sentences
                .into_iter()
                .enumerate()
                .map(|(index, text)| Sentence { index, text })
                .collect(),
        }
    }

    #[must_use]
    pub fn sentence(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }
}

/// Pointer from a claim into the chunk index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub sentence_ids: Vec<usize>,
    pub quote: String,
}

/// Claim families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Actor,
    Entity,
    Flow,
    Rule,
    NonFunctional,
    OutOfScope,
    OpenQuestion,
    Ambiguity,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 8] = [
        ClaimKind::Actor,
        ClaimKind::Entity,
        ClaimKind::Flow,
        ClaimKind::Rule,
        ClaimKind::NonFunctional,
        ClaimKind::OutOfScope,
        ClaimKind::OpenQuestion,
        ClaimKind::Ambiguity,
    ];

    /// Id prefix
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            ClaimKind::Actor => "ACT",
            ClaimKind::Entity => "ENT",
            ClaimKind::Flow => "FLOW",
            ClaimKind::Rule => "RULE",
            ClaimKind::NonFunctional => "NFR",
            ClaimKind::OutOfScope => "OOS",
            ClaimKind::OpenQuestion => "Q",
            ClaimKind::Ambiguity => "AMB",
        }
    }

    /// Payload key used by the extraction contract
    #[must_use]
    pub fn payload_key(self) -> &'static str {
        match self {
            ClaimKind::Actor => "actors",
            ClaimKind::Entity => "entities",
            ClaimKind::Flow => "flows",
            ClaimKind::Rule => "rules",
            ClaimKind::NonFunctional => "non_functional",
            ClaimKind::OutOfScope => "out_of_scope",
            ClaimKind::OpenQuestion => "open_questions",
            ClaimKind::Ambiguity => "ambiguities",
        }
    }
}

/// A cited statement about the requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Kind-prefixed id, e.g. `FLOW-002`
    pub id: String,
    pub kind: ClaimKind,
    pub text: String,
    pub citation: Citation,
}

/// Pinned side of a fixed column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedSide {
    #[default]
    None,
    Left,
    Right,
}

/// Column described by a reference table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceColumn {
    pub name: String,
    pub is_new: bool,
    pub sortable: bool,
    pub fixed: FixedSide,
    /// Verbatim format rules
    pub format_rules: Option<String>,
    pub cross_page_parameter: Option<String>,
    pub edit_note: Option<String>,
    /// Chunk holding the source row
    pub chunk_id: String,
    /// Sentence index of the source row in that chunk
    pub row: usize,
}

/// A markdown table as headers plus rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePacket {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TablePacket {
    /// Row rendered as `header: value; ...`
    #[must_use]
    pub fn row_sentence(&self, row: &[String]) -> String {
        self.headers
            .iter()
            .zip(row)
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(h, v)| format!("{h}: {v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Inline emphasis style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStyle {
    Bold,
    Italic,
    Code,
}

/// Emphasized span of requirement text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatMarker {
    pub style: MarkerStyle,
    pub text: String,
}

/// Coverage status of a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceStatus {
    Covered,
    Ignored,
}

/// Status of one sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceCoverage {
    pub chunk_id: String,
    pub sentence_id: usize,
    pub status: SentenceStatus,
}

/// Ticket metadata carried into the IR
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMeta {
    pub key: String,
    pub summary: String,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub labels: Vec<String>,
}

/// How claims were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrSource {
    Model,
    Deterministic,
}

/// Structured, traceable requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementIr {
    pub meta: TicketMeta,
    pub source: IrSource,
    pub chunks: Vec<Chunk>,
    pub claims: Vec<Claim>,
    pub coverage: Vec<SentenceCoverage>,
    pub tables: Vec<TablePacket>,
    pub reference_columns: Vec<ReferenceColumn>,
    pub format_markers: Vec<FormatMarker>,
    /// Flow texts, kept for consumers of the older scenario list
    pub scenarios: Vec<String>,
}

impl RequirementIr {
    #[must_use]
    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn claim(&self, id: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.id == id)
    }

    /// Claims of one kind, in id order
    pub fn claims_of(&self, kind: ClaimKind) -> impl Iterator<Item = &Claim> {
        self.claims.iter().filter(move |c| c.kind == kind)
    }

    /// Reference column by case-insensitive name
    #[must_use]
    pub fn reference_column(&self, name: &str) -> Option<&ReferenceColumn> {
        let name = name.trim();
        self.reference_columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// (covered, ignored) sentence counts
    #[must_use]
    pub fn coverage_counts(&self) -> (usize, usize) {
        let covered = self
            .coverage
            .iter()
            .filter(|c| c.status == SentenceStatus::Covered)
            .count();
        (covered, self.coverage.len() - covered)
    }

    /// Whether `citation` points at an existing sentence range
    #[must_use]
    pub fn resolves(&self, citation: &Citation) -> bool {
        self.chunk(&citation.chunk_id).is_some_and(|chunk| {
            citation
                .sentence_ids
                .iter()
                .all(|&i| i < chunk.sentences.len())
        })
    }
}
