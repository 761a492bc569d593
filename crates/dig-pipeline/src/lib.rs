//! DIG Pipeline - Per-document concept graph builds
//!
//! One build runs the stages in order:
//! 1. text extraction (archives expanded one level, members built independently)
//! 2. segmentation into passages
//! 3. candidate detection, one blocking task per passage, `workers` at a time
//! 4. barrier: document term statistics, then scoring
//! 5. resolution, inference and graph assembly as one sequential reduce
//!
//! Nothing is visible outside the build until the finished graph is
//! published to the `GraphCatalog`. Cancellation is honoured before each
//! passage and between stages; a cancelled build publishes nothing.

pub mod catalog;
pub mod registry;

pub use catalog::GraphCatalog;
pub use registry::{BuildPermit, BuildRegistry, BuildTicket, SharedOutcome};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use dig_core::{
    AppConfig, DigError, Document, DocumentFormat, DocumentId, Mention, Passage, Result, Stage,
};
use dig_extractor::{
    ConceptExtractor, ConceptResolver, PassageCandidates, RelationshipInferencer, TermStatistics,
};
use dig_graph::{ConceptGraph, GraphBuilder, GraphDiff};
use dig_parser::{
    DocumentProfile, ExtractedDocument, Extraction, ExtractionWarning, ParserError, Segmenter,
    TextExtractor,
};

// ============================================================================
// Results
// ============================================================================

/// A successfully built document
#[derive(Debug, Clone)]
pub struct DocumentBuild {
    pub document_id: DocumentId,
    pub format: DocumentFormat,
    /// Passages with provenance, for retrieval consumers
    pub passages: Arc<Vec<Passage>>,
    pub graph: Arc<ConceptGraph>,
    /// Changes against the previously published graph, if there was one
    pub diff: Option<GraphDiff>,
    pub warnings: Vec<ExtractionWarning>,
    pub profile: DocumentProfile,
}

/// Outcome of one ingest request
///
/// A plain document has exactly one outcome; an archive has one per member,
/// and a failed member does not affect its siblings.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub outcomes: Vec<Result<DocumentBuild>>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl IngestReport {
    pub fn builds(&self) -> impl Iterator<Item = &DocumentBuild> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &DigError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    /// Outcome for one document or archive member
    pub fn outcome(&self, document_id: &DocumentId) -> Option<&Result<DocumentBuild>> {
        self.outcomes.iter().find(|o| match o {
            Ok(build) => build.document_id == *document_id,
            Err(err) => err.document_id() == Some(document_id),
        })
    }

    pub fn build(&self, document_id: &DocumentId) -> Option<&DocumentBuild> {
        self.outcome(document_id).and_then(|o| o.as_ref().ok())
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn parser_error(document_id: &DocumentId, err: ParserError) -> DigError {
    match err {
        ParserError::UnsupportedFormat(format) => DigError::UnsupportedFormat {
            document_id: document_id.clone(),
            format,
        },
        other => DigError::CorruptDocument {
            document_id: document_id.clone(),
            stage: Stage::Extract,
            unit: None,
            reason: other.to_string(),
        },
    }
}

fn join_error(document_id: &DocumentId, stage: Stage, unit: Option<String>, err: JoinError) -> DigError {
    tracing::error!(document_id = %document_id, stage = %stage, error = %err, "Worker task failed");
    DigError::CorruptDocument {
        document_id: document_id.clone(),
        stage,
        unit,
        reason: format!("worker task failed: {err}"),
    }
}

/// A member's outcome taken from another build that ran under its id
fn joined_member(shared: SharedOutcome, member_id: &DocumentId) -> Result<DocumentBuild> {
    let report = match shared {
        Ok(report) => report,
        // The other request was cancelled; that is not this archive's cancellation
        Err(DigError::Cancelled { .. }) => {
            return Err(DigError::Conflict {
                document_id: member_id.clone(),
            })
        }
        Err(err) => return Err(err),
    };
    match report.outcome(member_id) {
        Some(outcome) => outcome.clone(),
        None => Err(DigError::Conflict {
            document_id: member_id.clone(),
        }),
    }
}

fn check_cancel(cancel: &CancellationToken, document_id: &DocumentId, stage: Stage) -> Result<()> {
    if cancel.is_cancelled() {
        tracing::info!(document_id = %document_id, stage = %stage, "Build cancelled");
        return Err(DigError::Cancelled {
            document_id: document_id.clone(),
            stage,
        });
    }
    Ok(())
}

/// Read a document from disk, taking the format from the extension unless given
pub async fn load_document(
    path: &Path,
    format: Option<DocumentFormat>,
    document_id: Option<DocumentId>,
) -> Result<Document> {
    let document_id = document_id.unwrap_or_else(|| {
        DocumentId::new(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        )
    });
    let format = format
        .or_else(|| DocumentFormat::from_path(path))
        .ok_or_else(|| DigError::UnsupportedFormat {
            document_id: document_id.clone(),
            format: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })?;
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| DigError::CorruptDocument {
            document_id: document_id.clone(),
            stage: Stage::Extract,
            unit: None,
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
    Ok(Document::new(document_id, format, content))
}

// ============================================================================
// Concept Pipeline
// ============================================================================

/// Turns documents into published concept graphs
pub struct ConceptPipeline {
    config: AppConfig,
    extractor: Arc<TextExtractor>,
    segmenter: Segmenter,
    concepts: Arc<ConceptExtractor>,
    resolver: ConceptResolver,
    inferencer: RelationshipInferencer,
    registry: BuildRegistry,
    catalog: GraphCatalog,
}

impl ConceptPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            extractor: Arc::new(TextExtractor::new()),
            segmenter: Segmenter::new(config.segmenter.clone()),
            concepts: Arc::new(ConceptExtractor::new(config.extraction.clone())),
            resolver: ConceptResolver::new(config.resolver.clone()),
            inferencer: RelationshipInferencer::new(config.inference.clone()),
            registry: BuildRegistry::new(),
            catalog: GraphCatalog::new(),
            config,
        }
    }

    /// Use a custom set of format readers
    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Publish into a catalog shared with other components
    pub fn with_catalog(mut self, catalog: GraphCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &GraphCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &BuildRegistry {
        &self.registry
    }

    /// Latest published graph for a document
    pub async fn graph(&self, document_id: &DocumentId) -> Option<Arc<ConceptGraph>> {
        self.catalog.get(document_id).await
    }

    pub async fn ingest(&self, document: Document) -> SharedOutcome {
        self.ingest_with_cancel(document, CancellationToken::new()).await
    }

    /// Build a document, at most one build per document id at a time
    pub async fn ingest_with_cancel(
        &self,
        document: Document,
        cancel: CancellationToken,
    ) -> SharedOutcome {
        let policy = self.config.pipeline.conflict_policy;
        let timeout = Duration::from_millis(self.config.pipeline.wait_timeout_ms);

        match self.registry.acquire(&document.id, policy, timeout).await? {
            BuildTicket::Joined(outcome) => {
                tracing::debug!(document_id = %document.id, "Joined in-flight build");
                outcome
            }
            BuildTicket::Permit(permit) => {
                let outcome = self.run(&document, &cancel).await.map(Arc::new);
                permit.complete(outcome.clone());
                outcome
            }
        }
    }

    async fn run(&self, document: &Document, cancel: &CancellationToken) -> Result<IngestReport> {
        let start = Instant::now();
        let id = document.id.clone();

        tracing::info!(
            document_id = %id,
            format = %document.format,
            bytes = document.content.len(),
            "Ingest started"
        );

        check_cancel(cancel, &id, Stage::Extract)?;
        let extraction = {
            let extractor = Arc::clone(&self.extractor);
            let document = document.clone();
            tokio::task::spawn_blocking(move || extractor.extract(&document))
                .await
                .map_err(|e| join_error(&id, Stage::Extract, None, e))?
                .map_err(|e| parser_error(&id, e))?
        };

        let policy = self.config.pipeline.conflict_policy;
        let timeout = Duration::from_millis(self.config.pipeline.wait_timeout_ms);

        let mut outcomes = Vec::new();
        // Members built here, each held under its own permit until published
        let mut member_permits: Vec<BuildPermit> = Vec::new();
        // Members whose result came from another in-flight build; already published
        let mut joined: HashSet<DocumentId> = HashSet::new();

        match extraction {
            Extraction::Single(extracted) => {
                outcomes.push(Ok(self.build_document(extracted, cancel).await?));
            }
            Extraction::Archive(members) => {
                tracing::info!(document_id = %id, members = members.len(), "Expanded archive");
                for member in members {
                    let member_id = member.document_id.clone();
                    let outcome = match self.registry.acquire(&member_id, policy, timeout).await {
                        Ok(BuildTicket::Permit(permit)) => {
                            member_permits.push(permit);
                            match member.result {
                                Ok(extracted) => self.build_document(extracted, cancel).await,
                                Err(err) => Err(parser_error(&member_id, err)),
                            }
                        }
                        Ok(BuildTicket::Joined(shared)) => {
                            tracing::debug!(document_id = %member_id, "Joined in-flight member build");
                            joined.insert(member_id.clone());
                            joined_member(shared, &member_id)
                        }
                        Err(err) => Err(err),
                    };
                    match outcome {
                        Err(DigError::Cancelled { stage, .. }) => {
                            return Err(DigError::Cancelled {
                                document_id: id,
                                stage,
                            });
                        }
                        Err(err) => {
                            tracing::warn!(
                                document_id = %id,
                                member = %member.path,
                                error = %err,
                                "Archive member failed"
                            );
                            outcomes.push(Err(err));
                        }
                        Ok(build) => outcomes.push(Ok(build)),
                    }
                }
            }
        }

        // Last exit before anything becomes visible
        check_cancel(cancel, &id, Stage::Build)?;
        for build in outcomes.iter_mut().filter_map(|o| o.as_mut().ok()) {
            if !joined.contains(&build.document_id) {
                build.diff = self.catalog.publish(Arc::clone(&build.graph)).await;
            }
        }

        let completed_at = Utc::now();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        for permit in member_permits {
            let member_id = permit.document_id().clone();
            let member_outcomes = outcomes
                .iter()
                .filter(|o| match o {
                    Ok(build) => build.document_id == member_id,
                    Err(err) => err.document_id() == Some(&member_id),
                })
                .cloned()
                .collect();
            permit.complete(Ok(Arc::new(IngestReport {
                document_id: member_id,
                outcomes: member_outcomes,
                completed_at,
                elapsed_ms,
            })));
        }

        let report = IngestReport {
            document_id: id,
            outcomes,
            completed_at,
            elapsed_ms,
        };

        tracing::info!(
            document_id = %report.document_id,
            built = report.builds().count(),
            failed = report.failures().count(),
            elapsed_ms = report.elapsed_ms,
            "Ingest finished"
        );

        Ok(report)
    }

    async fn build_document(
        &self,
        extracted: ExtractedDocument,
        cancel: &CancellationToken,
    ) -> Result<DocumentBuild> {
        let start = Instant::now();
        let id = extracted.document_id.clone();

        check_cancel(cancel, &id, Stage::Segment)?;
        let passages = Arc::new(self.segmenter.segment(&id, &extracted.units));

        // Parallel map: detection reads one passage and shares nothing
        let workers = self.config.pipeline.workers.max(1);
        let candidates: Vec<PassageCandidates> = stream::iter(0..passages.len())
            .map(|index| {
                let concepts = Arc::clone(&self.concepts);
                let passages = Arc::clone(&passages);
                let cancel = cancel.clone();
                let id = id.clone();
                async move {
                    check_cancel(&cancel, &id, Stage::Concepts)?;
                    let unit = passages[index].id.to_string();
                    tokio::task::spawn_blocking(move || concepts.detect(&passages[index]))
                        .await
                        .map_err(|e| join_error(&id, Stage::Concepts, Some(unit), e))
                }
            })
            .buffered(workers)
            .try_collect()
            .await?;

        // Barrier: document statistics exist only once every passage is in
        let stats = TermStatistics::from_candidates(&candidates);
        check_cancel(cancel, &id, Stage::Resolve)?;

        let base_version = self.catalog.current_version(&id).await;
        let graph = {
            let concepts = Arc::clone(&self.concepts);
            let resolver = self.resolver.clone();
            let inferencer = self.inferencer.clone();
            let passages = Arc::clone(&passages);
            let cancel = cancel.clone();
            let task_id = id.clone();
            tokio::task::spawn_blocking(move || -> Result<ConceptGraph> {
                let mentions: Vec<Mention> = candidates
                    .iter()
                    .flat_map(|c| concepts.score(c, &stats))
                    .collect();

                check_cancel(&cancel, &task_id, Stage::Resolve)?;
                let resolved = resolver.resolve(&mentions);

                check_cancel(&cancel, &task_id, Stage::Infer)?;
                let relationships = inferencer.infer(&resolved, &passages);

                check_cancel(&cancel, &task_id, Stage::Build)?;
                let mut builder = GraphBuilder::new(task_id.clone()).with_base_version(base_version);
                for concept in resolved.concepts {
                    builder.add_concept(concept)?;
                }
                for relationship in relationships {
                    builder.add_relationship(relationship)?;
                }

                tracing::debug!(
                    document_id = %task_id,
                    terms = stats.term_count(),
                    mentions = mentions.len(),
                    "Reduced document"
                );
                builder.build()
            })
            .await
            .map_err(|e| join_error(&id, Stage::Resolve, None, e))??
        };

        tracing::info!(
            document_id = %id,
            units = extracted.units.len(),
            passages = passages.len(),
            concepts = graph.concept_count(),
            relationships = graph.relationship_count(),
            version = graph.version(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Document built"
        );

        Ok(DocumentBuild {
            document_id: id,
            format: extracted.format,
            passages,
            graph: Arc::new(graph),
            diff: None,
            warnings: extracted.warnings,
            profile: extracted.profile,
        })
    }
}

impl Default for ConceptPipeline {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: &str, body: &str) -> Document {
        Document::new(id, DocumentFormat::PlainText, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_empty_document_gives_empty_graph() {
        let pipeline = ConceptPipeline::default();
        let report = pipeline.ingest(text("empty", "   \n")).await.unwrap();
        let build = report.build(&DocumentId::new("empty")).unwrap();
        assert!(build.graph.is_empty());
        assert!(build.passages.is_empty());
        assert!(pipeline.graph(&DocumentId::new("empty")).await.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected() {
        let pipeline = ConceptPipeline::default();
        let doc = Document::new("old-deck", DocumentFormat::Ppt, vec![0xD0, 0xCF]);
        let err = pipeline.ingest(doc).await.unwrap_err();
        assert!(matches!(err, DigError::UnsupportedFormat { .. }));
        assert_eq!(err.document_id(), Some(&DocumentId::new("old-deck")));
    }

    #[tokio::test]
    async fn test_cancelled_build_publishes_nothing() {
        let pipeline = ConceptPipeline::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline
            .ingest_with_cancel(text("doc", "Neural networks learn."), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DigError::Cancelled { stage: Stage::Extract, .. }));
        assert!(pipeline.graph(&DocumentId::new("doc")).await.is_none());
        assert!(!pipeline.registry().is_in_flight(&DocumentId::new("doc")));
    }

    #[tokio::test]
    async fn test_load_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, "# Entropy\n").await.unwrap();

        let doc = load_document(&path, None, None).await.unwrap();
        assert_eq!(doc.id, DocumentId::new("notes.md"));
        assert_eq!(doc.format, DocumentFormat::Markdown);

        let missing = load_document(&dir.path().join("gone.txt"), None, None).await;
        assert!(matches!(missing, Err(DigError::CorruptDocument { .. })));

        let unknown = load_document(&dir.path().join("data.bin"), None, None).await;
        assert!(matches!(unknown, Err(DigError::UnsupportedFormat { .. })));
    }
}
