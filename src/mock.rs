//! Deterministic in-process providers for tests and local development.
//!
//! [`HashingEmbedder`] is not a semantic model: it hashes words into
//! buckets, so texts sharing vocabulary score high under cosine similarity
//! and unrelated texts score near zero. That is enough to exercise every
//! retrieval property deterministically without a network or a model file.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    embedding::EmbeddingProvider,
    error::{Error, Result},
    extraction::{SourceFormat, TextExtractor},
    generation::GenerationService,
};

/// Bag-of-words hashing embedder with L2-normalized output.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

/// Embedding provider that always fails; exercises rollback paths.
#[derive(Debug)]
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingService("embedding service offline".into()))
    }
}

/// Generation service returning scripted replies.
///
/// With a single reply it answers every call identically; with a script it
/// pops replies in order and errors when the script runs dry.
#[derive(Debug)]
pub struct CannedGenerator {
    script: Mutex<Vec<String>>,
    repeat_last: bool,
}

impl CannedGenerator {
    /// Always reply with `reply`.
    pub fn new(reply: &str) -> Self {
        Self {
            script: Mutex::new(vec![reply.to_string()]),
            repeat_last: true,
        }
    }

    /// Reply with each script entry once, in order.
    pub fn with_script<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script: Vec<String> =
            replies.into_iter().map(Into::into).collect();
        script.reverse();
        Self {
            script: Mutex::new(script),
            repeat_last: false,
        }
    }
}

#[async_trait]
impl GenerationService for CannedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let mut script = self.script.lock().expect("script lock");
        if self.repeat_last {
            return Ok(script.last().cloned().unwrap_or_default());
        }
        script.pop().ok_or_else(|| {
            Error::GenerationService("scripted replies exhausted".into())
        })
    }
}

/// Extractor for plain-text payloads; rejects binary formats.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(
        &self,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<String> {
        match format {
            SourceFormat::PlainText => String::from_utf8(bytes.to_vec())
                .map_err(|_| {
                    Error::CorruptFile("payload is not valid UTF-8".into())
                }),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}
