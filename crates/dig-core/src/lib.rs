//! DIG Core - Domain models, errors and shared types
//!
//! This crate defines the core abstractions used throughout the DIG system:
//! - Document, passage and mention models with source provenance
//! - Canonical concepts and weighted, typed relationships
//! - The caller-facing error taxonomy
//! - Configuration management
//! - Term normalization shared by every pipeline stage

pub mod config;
pub mod text;

pub use config::{
    AppConfig, ConfigError, ConflictPolicy, ExtractionConfig, InferenceConfig, LoggingConfig,
    PipelineConfig, ResolverConfig, SegmenterConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Pipeline stage, used to give failures enough context for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Segment,
    Concepts,
    Resolve,
    Infer,
    Build,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extract => write!(f, "extract"),
            Self::Segment => write!(f, "segment"),
            Self::Concepts => write!(f, "concepts"),
            Self::Resolve => write!(f, "resolve"),
            Self::Infer => write!(f, "infer"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// Core error types for DIG operations
///
/// `Clone` so that the result of an in-flight build can be handed to
/// every request waiting on the same document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DigError {
    #[error("Unsupported format '{format}' for document {document_id}")]
    UnsupportedFormat {
        document_id: DocumentId,
        format: String,
    },

    #[error("Corrupt document {document_id} at {stage} (unit: {}): {reason}", unit.as_deref().unwrap_or("-"))]
    CorruptDocument {
        document_id: DocumentId,
        stage: Stage,
        unit: Option<String>,
        reason: String,
    },

    #[error("Graph integrity violation for document {document_id}: {reason}")]
    GraphIntegrity {
        document_id: DocumentId,
        reason: String,
    },

    #[error("A build for document {document_id} is already in flight")]
    Conflict { document_id: DocumentId },

    #[error("Build for document {document_id} cancelled during {stage}")]
    Cancelled {
        document_id: DocumentId,
        stage: Stage,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DigError {
    /// Document the failure belongs to, if any
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            Self::UnsupportedFormat { document_id, .. }
            | Self::CorruptDocument { document_id, .. }
            | Self::GraphIntegrity { document_id, .. }
            | Self::Conflict { document_id }
            | Self::Cancelled { document_id, .. } => Some(document_id),
            Self::Config(_) => None,
        }
    }

    /// Stage the failure happened in, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::UnsupportedFormat { .. } => Some(Stage::Extract),
            Self::CorruptDocument { stage, .. } | Self::Cancelled { stage, .. } => Some(*stage),
            Self::GraphIntegrity { .. } => Some(Stage::Build),
            Self::Conflict { .. } | Self::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DigError>;

// ============================================================================
// Documents
// ============================================================================

/// Caller-supplied document identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of a member inside an archive document
    pub fn member(&self, name: &str) -> Self {
        Self(format!("{}/{}", self.0, name))
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Concrete document formats accepted at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    PlainText,
    Markdown,
    Docx,
    Pptx,
    /// Legacy binary PowerPoint; recognized but not parseable
    Ppt,
    Zip,
}

/// Format family, which decides how a document is expanded into text units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    PaginatedText,
    SlideDeck,
    Archive,
}

impl DocumentFormat {
    /// Parse a declared format tag (`"pdf"`, `".PPTX"`, `"markdown"`, ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "ppt" => Some(Self::Ppt),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    /// Detect format from a file path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_tag)
    }

    /// Format family, or `None` when the format cannot be parsed at all
    pub fn kind(&self) -> Option<FormatKind> {
        match self {
            Self::Pdf | Self::PlainText | Self::Markdown | Self::Docx => {
                Some(FormatKind::PaginatedText)
            }
            Self::Pptx => Some(FormatKind::SlideDeck),
            Self::Zip => Some(FormatKind::Archive),
            Self::Ppt => None,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::PlainText => write!(f, "text"),
            Self::Markdown => write!(f, "markdown"),
            Self::Docx => write!(f, "docx"),
            Self::Pptx => write!(f, "pptx"),
            Self::Ppt => write!(f, "ppt"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// A raw document as handed over by the upload layer
///
/// Immutable once ingested; a re-upload is a new `Document` value.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub format: DocumentFormat,
    pub content: Vec<u8>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, format: DocumentFormat, content: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            format,
            content,
        }
    }
}

// ============================================================================
// Passages and Mentions
// ============================================================================

/// Provenance unit inside a document (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum SourceUnit {
    Page(u32),
    Slide(u32),
}

impl SourceUnit {
    pub fn index(&self) -> u32 {
        match self {
            Self::Page(i) | Self::Slide(i) => *i,
        }
    }

    pub fn is_slide(&self) -> bool {
        matches!(self, Self::Slide(_))
    }
}

impl std::fmt::Display for SourceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Page(i) => write!(f, "page {i}"),
            Self::Slide(i) => write!(f, "slide {i}"),
        }
    }
}

/// Where a passage came from: unit plus byte offsets into the unit text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub unit: SourceUnit,
    pub start: usize,
    pub end: usize,
}

/// Passage ordinal within its document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassageId(pub u32);

impl PassageId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PassageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{:04}", self.0)
    }
}

/// A bounded, provenance-tagged unit of document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub document_id: DocumentId,
    pub location: SourceLocation,
    pub text: String,
    /// Shorter than the configured minimum (slide titles, captions)
    pub low_density: bool,
}

/// A candidate concept occurrence within one passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub surface: String,
    pub passage_id: PassageId,
    /// Byte span within the passage text
    pub start: usize,
    pub end: usize,
    /// Salience normalized per passage, in [0, 1]
    pub salience: f32,
    #[serde(default)]
    pub kind: ConceptKind,
}

// ============================================================================
// Concepts
// ============================================================================

const CONCEPT_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_4a0e_93c2_4b7e_8a55_1c0f_2e9d_7b31);

/// Deterministic concept identifier derived from the canonical label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(Uuid);

impl ConceptId {
    /// Identifier for a label; the label is normalized first
    pub fn from_label(label: &str) -> Self {
        Self(Uuid::new_v5(
            &CONCEPT_NAMESPACE,
            text::normalize_term(label).as_bytes(),
        ))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What sort of knowledge a concept names
///
/// Variants are listed from weakest to strongest evidence; a concept keeps
/// the strongest kind any of its mentions carried.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    #[default]
    General,
    /// Written as an acronym (`CNN`, `SVD`)
    Acronym,
    /// Named by a heading or slide title
    Topic,
    /// Introduced with a definition cue
    Defined,
    Mathematical,
    Method,
    Theory,
}

static THEORY_WORDS: &[&str] = &["theorem", "principle", "law", "laws", "theory", "model", "models"];
static METHOD_WORDS: &[&str] = &[
    "algorithm", "algorithms", "method", "methods", "technique", "techniques", "approach",
    "procedure", "descent", "search", "regression", "sampling",
];
static MATH_WORDS: &[&str] = &[
    "equation", "equations", "formula", "function", "functions", "variable", "variables",
    "constant", "matrix", "vector", "integral", "derivative", "algebra", "calculus",
];

impl ConceptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Acronym => "acronym",
            Self::Topic => "topic",
            Self::Defined => "defined",
            Self::Mathematical => "mathematical",
            Self::Method => "method",
            Self::Theory => "theory",
        }
    }

    /// Kind implied by the words of a label alone
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |lexicon: &[&str]| words.iter().any(|w| lexicon.contains(w));

        if has(THEORY_WORDS) {
            Some(Self::Theory)
        } else if has(METHOD_WORDS) {
            Some(Self::Method)
        } else if has(MATH_WORDS) {
            Some(Self::Mathematical)
        } else {
            None
        }
    }

    /// The stronger of two kinds
    pub fn strongest(self, other: Self) -> Self {
        self.max(other)
    }
}

impl std::fmt::Display for ConceptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical, deduplicated knowledge-graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub label: String,
    /// Surface forms seen for this concept
    pub aliases: BTreeSet<String>,
    /// Sum of mention salience, capped at 1.0
    pub salience: f32,
    pub passages: BTreeSet<PassageId>,
    pub mention_count: u32,
    #[serde(default)]
    pub kind: ConceptKind,
}

impl Concept {
    /// Create an empty concept for a canonical label
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: ConceptId::from_label(&label),
            aliases: BTreeSet::from([label.clone()]),
            label,
            salience: 0.0,
            passages: BTreeSet::new(),
            mention_count: 0,
            kind: ConceptKind::default(),
        }
    }

    /// Merge one mention in; salience never decreases
    pub fn absorb(&mut self, mention: &Mention) {
        self.aliases.insert(text::display_form(&mention.surface));
        self.passages.insert(mention.passage_id);
        self.salience = (self.salience + mention.salience.clamp(0.0, 1.0)).min(1.0);
        self.mention_count += 1;
        self.kind = self.kind.strongest(mention.kind);
    }

    /// Merge another concept's evidence into this one
    pub fn merge(&mut self, other: &Concept) {
        self.aliases.extend(other.aliases.iter().cloned());
        self.passages.extend(other.passages.iter().copied());
        self.salience = (self.salience + other.salience.clamp(0.0, 1.0)).min(1.0);
        self.mention_count += other.mention_count;
        self.kind = self.kind.strongest(other.kind);
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Relationship types between concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Linked only through neighbouring passages
    CoOccurrence,
    /// Source must be understood before target
    Prerequisite,
    /// Source is a part, kind or member of target
    PartOf,
    /// Discussed together in at least one passage
    GenericAssociation,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoOccurrence => "co_occurrence",
            Self::Prerequisite => "prerequisite",
            Self::PartOf => "part_of",
            Self::GenericAssociation => "generic_association",
        }
    }

    pub fn is_directed(&self) -> bool {
        matches!(self, Self::Prerequisite | Self::PartOf)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an edge: at most one relationship per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: ConceptId,
    pub target: ConceptId,
    pub relation: RelationType,
}

impl EdgeKey {
    /// Build a key; undirected relations are stored with the smaller id first
    pub fn new(source: ConceptId, target: ConceptId, relation: RelationType) -> Self {
        let (source, target) = if !relation.is_directed() && target < source {
            (target, source)
        } else {
            (source, target)
        };
        Self {
            source,
            target,
            relation,
        }
    }

    pub fn touches(&self, id: &ConceptId) -> bool {
        self.source == *id || self.target == *id
    }
}

/// A weighted, typed edge between two concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: ConceptId,
    pub target: ConceptId,
    pub relation: RelationType,
    /// Weight in [0, 1]
    pub weight: f32,
    /// Accumulated co-occurrence or cue evidence
    pub evidence: f32,
    pub passages: BTreeSet<PassageId>,
}

impl Relationship {
    pub fn new(
        source: ConceptId,
        target: ConceptId,
        relation: RelationType,
        weight: f32,
        evidence: f32,
        passages: BTreeSet<PassageId>,
    ) -> Self {
        let key = EdgeKey::new(source, target, relation);
        Self {
            source: key.source,
            target: key.target,
            relation,
            weight: weight.clamp(0.0, 1.0),
            evidence,
            passages,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source, self.target, self.relation)
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Fold repeated evidence for the same key into this edge
    pub fn reinforce(&mut self, other: &Relationship) {
        self.weight = combine_weights(self.weight, other.weight);
        self.evidence += other.evidence;
        self.passages.extend(other.passages.iter().copied());
    }
}

/// Combine two independent weights; strictly increases `a` whenever `a < 1` and `b > 0`
pub fn combine_weights(a: f32, b: f32) -> f32 {
    let a = a.clamp(0.0, 1.0);
    let b = b.clamp(0.0, 1.0);
    if b == 0.0 || a == 1.0 {
        return a;
    }
    (1.0 - (1.0 - a) * (1.0 - b)).clamp(0.0, 1.0)
}

/// Saturating evidence factor `e / (e + smoothing)`
pub fn evidence_factor(evidence: f32, smoothing: f32) -> f32 {
    if evidence <= 0.0 {
        return 0.0;
    }
    evidence / (evidence + smoothing.max(f32::EPSILON))
}

// ============================================================================
// Tests
// ============================================================================
