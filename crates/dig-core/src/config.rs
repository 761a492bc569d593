//! DIG Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Passage segmentation
    pub segmenter: SegmenterConfig,

    /// Concept candidate detection and scoring
    pub extraction: ExtractionConfig,

    /// Concept deduplication
    pub resolver: ResolverConfig,

    /// Relationship inference
    pub inference: InferenceConfig,

    /// Build orchestration
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.apply_env()
    }

    fn apply_env(mut self) -> Result<Self, ConfigError> {
        // Segmenter
        if let Some(v) = env_parse("DIG_MAX_PASSAGE_CHARS")? {
            self.segmenter.max_passage_chars = v;
        }
        if let Some(v) = env_parse("DIG_MIN_PASSAGE_CHARS")? {
            self.segmenter.min_passage_chars = v;
        }

        // Resolver / inference
        if let Some(v) = env_parse("DIG_SIMILARITY_THRESHOLD")? {
            self.resolver.similarity_threshold = v;
        }
        if let Some(v) = env_parse("DIG_MAX_CONCEPTS")? {
            self.resolver.max_concepts = v;
        }
        if let Some(v) = env_parse("DIG_COOCCURRENCE_WINDOW")? {
            self.inference.cooccurrence_window = v;
        }

        // Pipeline
        if let Some(v) = env_parse("DIG_WORKERS")? {
            self.pipeline.workers = v;
        }
        if let Ok(policy) = std::env::var("DIG_CONFLICT_POLICY") {
            self.pipeline.conflict_policy = policy.parse()?;
        }
        if let Some(v) = env_parse("DIG_WAIT_TIMEOUT_MS")? {
            self.pipeline.wait_timeout_ms = v;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = env_parse("LOG_JSON")? {
            self.logging.json_format = v;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segmenter.max_passage_chars == 0 {
            return Err(invalid("segmenter.max_passage_chars", 0));
        }
        if self.segmenter.min_passage_chars >= self.segmenter.max_passage_chars {
            return Err(invalid(
                "segmenter.min_passage_chars",
                self.segmenter.min_passage_chars,
            ));
        }
        if self.extraction.max_phrase_words == 0 {
            return Err(invalid("extraction.max_phrase_words", 0));
        }
        if !(0.0..=1.0).contains(&self.extraction.low_density_cap) {
            return Err(invalid(
                "extraction.low_density_cap",
                self.extraction.low_density_cap,
            ));
        }
        if !(0.0..=1.0).contains(&self.extraction.min_salience) {
            return Err(invalid(
                "extraction.min_salience",
                self.extraction.min_salience,
            ));
        }
        if !(0.0..=1.0).contains(&self.resolver.similarity_threshold)
            || self.resolver.similarity_threshold == 0.0
        {
            return Err(invalid(
                "resolver.similarity_threshold",
                self.resolver.similarity_threshold,
            ));
        }
        if self.resolver.max_concepts == 0 {
            return Err(invalid("resolver.max_concepts", 0));
        }
        if self.inference.evidence_smoothing <= 0.0 {
            return Err(invalid(
                "inference.evidence_smoothing",
                self.inference.evidence_smoothing,
            ));
        }
        if self.pipeline.workers == 0 {
            return Err(invalid("pipeline.workers", 0));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Passage segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Maximum passage length in characters
    pub max_passage_chars: usize,

    /// Passages shorter than this are flagged low-density
    pub min_passage_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_passage_chars: 1000,
            min_passage_chars: 20,
        }
    }
}

/// Concept extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Longest noun phrase kept as a single candidate
    pub max_phrase_words: usize,

    /// Weight multiplier for terms on heading lines
    pub heading_boost: f32,

    /// Weight multiplier for emphasized terms (`**term**`, `__term__`)
    pub emphasis_boost: f32,

    /// Weight multiplier for terms being defined ("X is defined as")
    pub definition_boost: f32,

    /// Salience ceiling inside low-density passages
    pub low_density_cap: f32,

    /// Mentions scoring below this are dropped
    pub min_salience: f32,

    /// Upper bound on mentions emitted per passage
    pub max_mentions_per_passage: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_phrase_words: 4,
            heading_boost: 2.0,
            emphasis_boost: 1.5,
            definition_boost: 1.8,
            low_density_cap: 0.3,
            min_salience: 0.05,
            max_mentions_per_passage: 40,
        }
    }
}

/// Concept resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Surface similarity two forms must exceed to merge
    pub similarity_threshold: f32,

    /// Passage distance within which similar forms count as shared context
    pub context_window: u32,

    /// Most concepts kept per document, spread across concept kinds
    pub max_concepts: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            context_window: 1,
            max_concepts: 80,
        }
    }
}

/// Relationship inference configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Neighbouring passages considered for co-occurrence
    pub cooccurrence_window: u32,

    /// Smoothing constant in `e / (e + smoothing)`
    pub evidence_smoothing: f32,

    /// Longest gap between two mentions a cue phrase may span
    pub max_cue_gap_chars: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            cooccurrence_window: 1,
            evidence_smoothing: 1.0,
            max_cue_gap_chars: 80,
        }
    }
}

/// What to do when a build for the same document is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Fail the new request immediately
    Reject,
    /// Wait for the running build and return its outcome
    Wait,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "wait" => Ok(Self::Wait),
            _ => Err(ConfigError::InvalidValue {
                key: "DIG_CONFLICT_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Build orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent passage workers during candidate detection
    pub workers: usize,

    /// Behaviour on concurrent builds of the same document
    pub conflict_policy: ConflictPolicy,

    /// How long a waiting request blocks before giving up
    pub wait_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            conflict_policy: ConflictPolicy::Reject,
            wait_timeout_ms: 30_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl From<ConfigError> for crate::DigError {
    fn from(err: ConfigError) -> Self {
        crate::DigError::Config(err.to_string())
    }
}
