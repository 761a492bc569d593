//! DIG CLI - Build and inspect concept graphs from documents
//!
//! Usage:
//!   dig ingest <path> [--mode full|focus|neighborhood] [--top-k N] [--passages]
//!   dig neighbors <path> <label>
//!   dig diff <old> <new>

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use dig_core::{AppConfig, ConceptId, DocumentFormat, DocumentId, Passage};
use dig_graph::{GraphDiff, GraphLayout, GraphStats, LayoutMode, Neighbor};
use dig_parser::{DocumentProfile, ExtractionWarning};
use dig_pipeline::{load_document, ConceptPipeline, DocumentBuild, IngestReport};

#[derive(Parser)]
#[command(name = "dig")]
#[command(about = "Document Intelligence Graph: concept graphs from academic documents")]
#[command(version)]
struct Cli {
    /// TOML configuration file; DIG_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Format tag (pdf, txt, md, docx, pptx, zip); defaults to the file extension
    #[arg(long, global = true)]
    format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the concept graph of a document and print its layout export
    Ingest {
        path: PathBuf,

        /// Document identifier; defaults to the file name
        #[arg(long)]
        document_id: Option<String>,

        #[arg(long, value_enum, default_value_t = Mode::Full)]
        mode: Mode,

        /// Concepts kept in focus mode
        #[arg(long, default_value_t = 20)]
        top_k: usize,

        /// Center concept label for neighborhood mode
        #[arg(long)]
        center: Option<String>,

        /// Hops around the center in neighborhood mode
        #[arg(long, default_value_t = 1)]
        depth: usize,

        /// Include passages with provenance in the output
        #[arg(long)]
        passages: bool,
    },
    /// List the direct neighbors of a concept
    Neighbors { path: PathBuf, label: String },
    /// Structural diff between two versions of the same document
    Diff { old: PathBuf, new: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Full,
    Focus,
    Neighborhood,
}

#[derive(Serialize)]
struct DocumentOutput<'a> {
    document_id: &'a DocumentId,
    format: String,
    layout: GraphLayout,
    stats: GraphStats,
    profile: &'a DocumentProfile,
    warnings: &'a [ExtractionWarning],
    #[serde(skip_serializing_if = "Option::is_none")]
    passages: Option<&'a [Passage]>,
}

#[derive(Serialize)]
struct FailureOutput<'a> {
    document_id: Option<&'a DocumentId>,
    stage: Option<String>,
    error: String,
}

#[derive(Serialize)]
struct IngestOutput<'a> {
    documents: Vec<DocumentOutput<'a>>,
    failures: Vec<FailureOutput<'a>>,
    completed_at: String,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct NeighborsOutput<'a> {
    concept_id: ConceptId,
    label: &'a str,
    salience: f32,
    neighbors: Vec<Neighbor>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.as_str().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_format(tag: Option<&str>) -> anyhow::Result<Option<DocumentFormat>> {
    tag.map(|t| DocumentFormat::from_tag(t).with_context(|| format!("unknown format tag '{t}'")))
        .transpose()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The build of a single, non-archive document
fn single_build<'a>(report: &'a IngestReport, path: &Path) -> anyhow::Result<&'a DocumentBuild> {
    if let Some(err) = report.failures().next() {
        bail!("{}: {err}", path.display());
    }
    let mut builds = report.builds();
    match (builds.next(), builds.next()) {
        (Some(build), None) => Ok(build),
        _ => bail!("{} must be a single document, not an archive", path.display()),
    }
}

async fn ingest_file(
    pipeline: &ConceptPipeline,
    path: &Path,
    format: Option<DocumentFormat>,
    document_id: Option<DocumentId>,
) -> anyhow::Result<std::sync::Arc<IngestReport>> {
    let document = load_document(path, format, document_id).await?;
    let report = pipeline
        .ingest(document)
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))?;
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    let format = parse_format(cli.format.as_deref())?;
    let pipeline = ConceptPipeline::new(config);

    match cli.command {
        Commands::Ingest {
            path,
            document_id,
            mode,
            top_k,
            center,
            depth,
            passages,
        } => {
            let report = ingest_file(&pipeline, &path, format, document_id.map(DocumentId::new)).await?;

            let mut documents = Vec::new();
            for build in report.builds() {
                let mode = match mode {
                    Mode::Full => LayoutMode::Full,
                    Mode::Focus => LayoutMode::Focus { top_k },
                    Mode::Neighborhood => {
                        let label = center
                            .as_deref()
                            .context("--center is required in neighborhood mode")?;
                        let Some(concept) = build.graph.find_concept(label) else {
                            tracing::warn!(document_id = %build.document_id, label, "Center concept not found");
                            continue;
                        };
                        LayoutMode::Neighborhood {
                            center: concept.id,
                            depth,
                        }
                    }
                };
                documents.push(DocumentOutput {
                    document_id: &build.document_id,
                    format: build.format.to_string(),
                    layout: build.graph.layout(mode),
                    stats: build.graph.stats(),
                    profile: &build.profile,
                    warnings: &build.warnings,
                    passages: passages.then_some(build.passages.as_slice()),
                });
            }

            let failures = report
                .failures()
                .map(|err| FailureOutput {
                    document_id: err.document_id(),
                    stage: err.stage().map(|s| s.to_string()),
                    error: err.to_string(),
                })
                .collect();

            print_json(&IngestOutput {
                documents,
                failures,
                completed_at: report.completed_at.to_rfc3339(),
                elapsed_ms: report.elapsed_ms,
            })?;
        }
        Commands::Neighbors { path, label } => {
            let report = ingest_file(&pipeline, &path, format, None).await?;
            let build = single_build(&report, &path)?;
            let concept = build
                .graph
                .find_concept(&label)
                .with_context(|| format!("no concept '{label}' in {}", path.display()))?;

            print_json(&NeighborsOutput {
                concept_id: concept.id,
                label: &concept.label,
                salience: concept.salience,
                neighbors: build.graph.neighbors(&concept.id),
            })?;
        }
        Commands::Diff { old, new } => {
            // Both versions are built under one identifier, as a re-upload would be
            let id = DocumentId::new(
                old.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string()),
            );
            let before = ingest_file(&pipeline, &old, format, Some(id.clone())).await?;
            let before = single_build(&before, &old)?;
            let after = ingest_file(&pipeline, &new, format, Some(id)).await?;
            let after = single_build(&after, &new)?;

            let diff = after
                .diff
                .clone()
                .unwrap_or_else(|| GraphDiff::between(&before.graph, &after.graph));
            print_json(&diff)?;
        }
    }

    Ok(())
}
