//! Pipeline configuration.
//!
//! All knobs the core needs from its environment live here, validated once
//! at startup. Invalid values are a deployment problem and are rejected
//! eagerly via [`PipelineConfig::validate`] rather than surfacing per
//! request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Default embedding dimensionality (MiniLM-class sentence encoders).
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Prefix for environment-variable overrides.
const ENV_PREFIX: &str = "LEXRAG_";

/// Configuration for a [`Pipeline`](crate::pipeline::Pipeline) instance.
///
/// # Examples
///
/// ```
/// use lexrag::config::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.chunk_size, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters. Must be strictly
    /// smaller than `chunk_size`.
    pub chunk_overlap: usize,
    /// Embedding vector length, fixed per deployment.
    pub embedding_dimension: usize,
    /// Minimum cosine similarity for a retrieved passage to count as
    /// relevant.
    pub similarity_floor: f32,
    /// Number of passages returned by retrieval when the caller does not
    /// ask for a specific count.
    pub default_k: usize,
    /// Retrieval fetches `k * overfetch_factor` candidates before floor
    /// filtering and deduplication.
    pub overfetch_factor: usize,
    /// Context window budget in characters.
    pub context_budget: usize,
    /// Smallest truncated passage fragment worth keeping in a context
    /// window, in characters.
    pub min_fragment_len: usize,
    /// Deadline for a single external embedding or generation call.
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            similarity_floor: 0.25,
            default_k: 4,
            overfetch_factor: 4,
            context_budget: 6000,
            min_fragment_len: 80,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Check every field, returning the first violation as
    /// [`Error::Config`].
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(Error::Config(
                "embedding_dimension must be positive".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_floor) {
            return Err(Error::Config(format!(
                "similarity_floor ({}) must lie in [-1, 1]",
                self.similarity_floor
            )));
        }
        if self.default_k == 0 {
            return Err(Error::Config("default_k must be positive".into()));
        }
        if self.overfetch_factor == 0 {
            return Err(Error::Config(
                "overfetch_factor must be at least 1".into(),
            ));
        }
        if self.min_fragment_len == 0 {
            return Err(Error::Config(
                "min_fragment_len must be positive".into(),
            ));
        }
        if self.context_budget < self.min_fragment_len {
            return Err(Error::Config(format!(
                "context_budget ({}) must be at least min_fragment_len ({})",
                self.context_budget, self.min_fragment_len
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Window advance between adjacent chunks.
    pub fn chunk_step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Load configuration from `LEXRAG_*` environment variables, falling
    /// back to defaults for unset variables. The result is validated.
    ///
    /// Recognized variables: `LEXRAG_CHUNK_SIZE`, `LEXRAG_CHUNK_OVERLAP`,
    /// `LEXRAG_EMBEDDING_DIMENSION`, `LEXRAG_SIMILARITY_FLOOR`,
    /// `LEXRAG_DEFAULT_K`, `LEXRAG_OVERFETCH_FACTOR`,
    /// `LEXRAG_CONTEXT_BUDGET`, `LEXRAG_MIN_FRAGMENT_LEN`,
    /// `LEXRAG_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parse("CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = env_parse("CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = env_parse("EMBEDDING_DIMENSION")? {
            config.embedding_dimension = v;
        }
        if let Some(v) = env_parse("SIMILARITY_FLOOR")? {
            config.similarity_floor = v;
        }
        if let Some(v) = env_parse("DEFAULT_K")? {
            config.default_k = v;
        }
        if let Some(v) = env_parse("OVERFETCH_FACTOR")? {
            config.overfetch_factor = v;
        }
        if let Some(v) = env_parse("CONTEXT_BUDGET")? {
            config.context_budget = v;
        }
        if let Some(v) = env_parse("MIN_FRAGMENT_LEN")? {
            config.min_fragment_len = v;
        }
        if let Some(v) = env_parse::<u64>("REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(v);
        }
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(suffix: &str) -> Result<Option<T>> {
    let key = format!("{ENV_PREFIX}{suffix}");
    match std::env::var(&key) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| {
            Error::Config(format!("could not parse {key}={raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}
