//! The pipeline context object.
//!
//! One [`Pipeline`] is constructed at process start from a validated
//! configuration, storage paths, and handles to the external services, and
//! is passed to every request handler. It owns the vector index and the
//! document store; there is no process-wide state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::{
    chunking::{self, Chunk},
    config::PipelineConfig,
    context::{self, ContextPassage, ContextWindow},
    doc_id::{ChunkId, DocumentId},
    document_store::DocumentStore,
    embedding::{self, EmbeddingProvider},
    error::{Error, Result},
    extraction::{SourceFormat, TextExtractor},
    generation::{self, GenerationService},
    orchestrator::{self, TaskKind, TaskOutput},
    retriever::{self, Passage},
    vector_index::{IndexEntry, VectorIndex},
};

/// What a summary, glossary, or question-suggestion request ranges over:
/// one ingested document, or whatever retrieval finds for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Document(String),
    Query(String),
}

impl Scope {
    fn label(&self) -> &str {
        match self {
            Self::Document(name) => name,
            Self::Query(query) => query,
        }
    }
}

/// An answer with the passages it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<ContextPassage>,
}

/// The RAG core: chunking, embedding, indexing, retrieval, and generation
/// behind one handle.
///
/// # Examples
///
/// ```no_run
/// use lexrag::{
///     config::PipelineConfig,
///     mock::{CannedGenerator, HashingEmbedder},
///     pipeline::Pipeline,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> lexrag::Result<()> {
/// let config = PipelineConfig::default();
/// let pipeline = Pipeline::open(
///     config.clone(),
///     std::path::Path::new("/var/lib/lexrag"),
///     Arc::new(HashingEmbedder::new(config.embedding_dimension)),
///     Arc::new(CannedGenerator::new("stub")),
/// )?;
///
/// pipeline.ingest("lease.txt", "The deposit is refundable.").await?;
/// let answer = pipeline.answer("Is the deposit refundable?").await?;
/// println!("{}", answer.text);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    index: VectorIndex,
    store: DocumentStore,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationService>,
    extractor: Option<Arc<dyn TextExtractor>>,
}

impl Pipeline {
    /// Validate the configuration and open the index and store under
    /// `data_dir` (created if missing).
    ///
    /// A provider whose dimensionality disagrees with the configuration is
    /// a deployment bug and is rejected here, before any request runs.
    pub fn open(
        config: PipelineConfig,
        data_dir: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationService>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.embedding_dimension {
            return Err(Error::DimensionMismatch {
                expected: config.embedding_dimension,
                actual: embedder.dimension(),
            });
        }

        std::fs::create_dir_all(data_dir)?;
        let index = VectorIndex::open(
            &data_dir.join("index.redb"),
            config.embedding_dimension,
        )?;
        let store = DocumentStore::open(&data_dir.join("store.redb"))?;

        tracing::info!(
            data_dir = %data_dir.display(),
            dimension = config.embedding_dimension,
            "pipeline ready"
        );
        Ok(Self {
            config,
            index,
            store,
            embedder,
            generator,
            extractor: None,
        })
    }

    /// Attach the external text-extraction service used by
    /// [`Pipeline::ingest_source`].
    pub fn with_extractor(
        mut self,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Chunk, embed, and index a document. Re-ingesting an identifier
    /// replaces its previous version entirely.
    ///
    /// The embedding call happens before any state changes, so a failed or
    /// timed-out call leaves the previous version of the document intact
    /// and fully searchable.
    pub async fn ingest(
        &self,
        name: &str,
        text: &str,
    ) -> Result<Vec<ChunkId>> {
        self.ingest_inner(name, text, SourceFormat::PlainText).await
    }

    /// Ingest from raw file bytes via the configured text extractor.
    pub async fn ingest_source(
        &self,
        name: &str,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<Vec<ChunkId>> {
        let extractor = self.extractor.as_ref().ok_or_else(|| {
            Error::Config("no text extractor configured".into())
        })?;
        let text = extractor.extract_text(bytes, format).await?;
        self.ingest_inner(name, &text, format).await
    }

    async fn ingest_inner(
        &self,
        name: &str,
        text: &str,
        format: SourceFormat,
    ) -> Result<Vec<ChunkId>> {
        let chunks = chunking::chunk_text(
            text,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        if chunks.len() > ChunkId::MAX_INDEX + 1 {
            return Err(Error::Config(format!(
                "document {name} splits into {} chunks, above the {} cap",
                chunks.len(),
                ChunkId::MAX_INDEX + 1
            )));
        }

        let vectors = self.embed_chunks(&chunks).await?;

        // External work done; now swap the stored version.
        let id = DocumentId::new(name);
        self.index.remove(name)?;
        let chunk_ids = self.store.put(&id, format, text, &chunks)?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                chunk_id: ChunkId::new(&id, chunk.index),
                document: name.to_string(),
                chunk_index: chunk.index as u32,
                vector,
            })
            .collect();
        if let Err(err) = self.index.add_batch(&entries) {
            // Local write failure mid-swap: unwind to "absent" rather than
            // leave a document half indexed.
            tracing::warn!(
                document = name,
                error = %err,
                "index write failed, unwinding partial ingest"
            );
            let _ = self.index.remove(name);
            let _ = self.store.delete(name);
            return Err(err);
        }

        tracing::info!(
            document = name,
            id = %id.short_hex(),
            chunks = chunk_ids.len(),
            "ingested document"
        );
        Ok(chunk_ids)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> =
            chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedding::embed_many_with_timeout(
            self.embedder.as_ref(),
            &texts,
            self.config.request_timeout,
        )
        .await?;

        if vectors.len() != chunks.len() {
            return Err(Error::EmbeddingService(format!(
                "batch embedding returned {} vectors for {} inputs",
                vectors.len(),
                chunks.len()
            )));
        }
        for vector in &vectors {
            if vector.len() != self.config.embedding_dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.config.embedding_dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }

    /// Remove a document from the index and the store. Idempotent; returns
    /// whether the document existed.
    pub fn remove_document(&self, name: &str) -> Result<bool> {
        self.index.remove(name)?;
        let existed = self.store.delete(name)?;
        if existed {
            tracing::info!(document = name, "removed document");
        }
        Ok(existed)
    }

    /// Top-`k` passages for a query, using the configured similarity
    /// floor.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Passage>> {
        retriever::retrieve(
            query,
            k,
            self.config.similarity_floor,
            self.embedder.as_ref(),
            &self.index,
            &self.store,
            &self.config,
        )
        .await
    }

    /// Answer a question grounded on retrieved passages.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let passages = self.retrieve(query, self.config.default_k).await?;
        let window = context::assemble(
            &passages,
            self.config.context_budget,
            self.config.min_fragment_len,
        );
        let output = orchestrator::generate(
            self.generator.as_ref(),
            TaskKind::Answer,
            query,
            None,
            &window,
            self.config.request_timeout,
        )
        .await?;

        Ok(Answer {
            text: output.into_text(),
            citations: window.passages().to_vec(),
        })
    }

    /// Summarize one document or the passages retrieved for a query.
    pub async fn summarize(&self, scope: &Scope) -> Result<String> {
        let window = self.context_for_scope(scope).await?;
        let output = orchestrator::generate(
            self.generator.as_ref(),
            TaskKind::Summarize,
            scope.label(),
            None,
            &window,
            self.config.request_timeout,
        )
        .await?;
        Ok(output.into_text())
    }

    /// Suggest a drafting improvement grounded on retrieved passages.
    pub async fn suggest(&self, query: &str, draft: &str) -> Result<String> {
        let passages = self.retrieve(query, self.config.default_k).await?;
        let window = context::assemble(
            &passages,
            self.config.context_budget,
            self.config.min_fragment_len,
        );
        let output = orchestrator::generate(
            self.generator.as_ref(),
            TaskKind::Suggest,
            query,
            Some(draft),
            &window,
            self.config.request_timeout,
        )
        .await?;
        Ok(output.into_text())
    }

    /// Build a term → definition glossary for a document or query scope.
    ///
    /// Best-effort: the mapping's shape is guaranteed, its completeness
    /// depends on the generation service honoring the output format.
    pub async fn glossary(
        &self,
        scope: &Scope,
    ) -> Result<BTreeMap<String, String>> {
        let window = self.context_for_scope(scope).await?;
        let output = orchestrator::generate(
            self.generator.as_ref(),
            TaskKind::Glossary,
            scope.label(),
            None,
            &window,
            self.config.request_timeout,
        )
        .await?;
        match output {
            TaskOutput::Glossary(map) => Ok(map),
            TaskOutput::Text(_) => Err(Error::Inconsistency(
                "glossary task produced unshaped output".into(),
            )),
        }
    }

    /// FAQ-style questions a reader might ask about the scope, topped up
    /// from a fixed fallback list when the model yields too few usable
    /// ones.
    pub async fn suggested_questions(
        &self,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<String>> {
        let window = self.context_for_scope(scope).await?;
        let prompt = orchestrator::build_questions_prompt(&window, limit);
        let raw = generation::complete_with_timeout(
            self.generator.as_ref(),
            &prompt,
            self.config.request_timeout,
        )
        .await?;
        Ok(orchestrator::parse_suggested_questions(&raw, limit))
    }

    /// Number of ingested documents.
    pub fn document_count(&self) -> Result<u64> {
        self.store.document_count()
    }

    /// Number of indexed chunk vectors.
    pub fn chunk_count(&self) -> Result<u64> {
        self.index.len()
    }

    async fn context_for_scope(&self, scope: &Scope) -> Result<ContextWindow> {
        let passages = match scope {
            Scope::Query(query) => {
                self.retrieve(query, self.config.default_k).await?
            }
            Scope::Document(name) => {
                let record = self.store.get_document(name)?;
                let id = DocumentId::new(name);
                vec![Passage {
                    chunk_id: ChunkId::new(&id, 0),
                    document: name.clone(),
                    chunk_index: 0,
                    text: record.text,
                    score: 1.0,
                }]
            }
        };
        Ok(context::assemble(
            &passages,
            self.config.context_budget,
            self.config.min_fragment_len,
        ))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        CannedGenerator, FailingEmbedder, HashingEmbedder, PlainTextExtractor,
    };

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            embedding_dimension: 64,
            ..Default::default()
        }
    }

    fn open_pipeline(dir: &Path) -> Pipeline {
        let config = test_config();
        Pipeline::open(
            config.clone(),
            dir,
            Arc::new(HashingEmbedder::new(config.embedding_dimension)),
            Arc::new(CannedGenerator::new("generated text")),
        )
        .unwrap()
    }

    #[test]
    fn open_rejects_mismatched_provider_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Pipeline::open(
            test_config(),
            tmp.path(),
            Arc::new(HashingEmbedder::new(128)),
            Arc::new(CannedGenerator::new("")),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 64,
                actual: 128,
            }
        ));
    }

    #[test]
    fn open_rejects_invalid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            chunk_overlap: 500,
            ..test_config()
        };
        assert!(matches!(
            Pipeline::open(
                config,
                tmp.path(),
                Arc::new(HashingEmbedder::new(64)),
                Arc::new(CannedGenerator::new("")),
            ),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn reingestion_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());
        let text = "The lessee shall maintain the premises. ".repeat(30);

        let first = pipeline.ingest("lease", &text).await.unwrap();
        let count_after_first = pipeline.chunk_count().unwrap();
        let second = pipeline.ingest("lease", &text).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(pipeline.chunk_count().unwrap(), count_after_first);
        assert_eq!(pipeline.document_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn reingestion_replaces_previous_version() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());

        let long = "An obligation survives termination. ".repeat(50);
        pipeline.ingest("doc", &long).await.unwrap();
        let old_count = pipeline.chunk_count().unwrap();
        assert!(old_count > 1);

        pipeline.ingest("doc", "short clause").await.unwrap();
        assert_eq!(pipeline.chunk_count().unwrap(), 1);

        let passages = pipeline.retrieve("obligation survives", 5).await.unwrap();
        assert!(passages.iter().all(|p| p.text == "short clause"));
    }

    #[tokio::test]
    async fn failed_embedding_leaves_previous_version_intact() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let pipeline = open_pipeline(tmp.path());
            pipeline.ingest("doc", "the original text").await.unwrap();
        }

        let config = test_config();
        let pipeline = Pipeline::open(
            config.clone(),
            tmp.path(),
            Arc::new(FailingEmbedder::new(config.embedding_dimension)),
            Arc::new(CannedGenerator::new("")),
        )
        .unwrap();

        let err = pipeline.ingest("doc", "replacement text").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingService(_)));
        assert!(err.is_retryable());

        // The old version is still stored and indexed.
        assert_eq!(pipeline.document_count().unwrap(), 1);
        assert_eq!(pipeline.chunk_count().unwrap(), 1);
        assert_eq!(
            pipeline.store.get_document("doc").unwrap().text,
            "the original text"
        );
    }

    #[tokio::test]
    async fn empty_text_ingests_no_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());
        let ids = pipeline.ingest("empty", "").await.unwrap();
        assert!(ids.is_empty());
        assert_eq!(pipeline.chunk_count().unwrap(), 0);
        assert_eq!(pipeline.document_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn remove_document_is_idempotent_and_unsearchable() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());
        pipeline.ingest("doc", "arbitration is binding").await.unwrap();

        assert!(pipeline.remove_document("doc").unwrap());
        assert!(!pipeline.remove_document("doc").unwrap());

        let passages =
            pipeline.retrieve("arbitration binding", 5).await.unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn ingest_source_requires_extractor() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());
        let err = pipeline
            .ingest_source("doc", b"bytes", SourceFormat::PlainText)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn ingest_source_extracts_and_tags_format() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline =
            open_pipeline(tmp.path()).with_extractor(Arc::new(PlainTextExtractor));

        pipeline
            .ingest_source("doc.txt", b"severability clause", SourceFormat::PlainText)
            .await
            .unwrap();
        let record = pipeline.store.get_document("doc.txt").unwrap();
        assert_eq!(record.text, "severability clause");
        assert_eq!(record.format, SourceFormat::PlainText);

        let err = pipeline
            .ingest_source("doc.pdf", b"%PDF-1.7", SourceFormat::Pdf)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        // Rejected before any ingestion state was touched.
        assert_eq!(pipeline.document_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn answer_cites_packed_passages() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());
        pipeline
            .ingest("lease", "the deposit is refundable on exit")
            .await
            .unwrap();

        let answer =
            pipeline.answer("is the deposit refundable").await.unwrap();
        assert_eq!(answer.text, "generated text");
        assert!(!answer.citations.is_empty());
        assert!(answer.citations[0].text.contains("deposit"));
    }

    #[tokio::test]
    async fn summarize_unknown_document_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = open_pipeline(tmp.path());
        let err = pipeline
            .summarize(&Scope::Document("missing".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound { kind: "document", .. }
        ));
    }

    #[tokio::test]
    async fn summarize_document_scope_uses_its_text() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let generator = Arc::new(CannedGenerator::new("a fine summary"));
        let pipeline = Pipeline::open(
            config.clone(),
            tmp.path(),
            Arc::new(HashingEmbedder::new(config.embedding_dimension)),
            generator,
        )
        .unwrap();
        pipeline.ingest("deed", "the grantor conveys the parcel").await.unwrap();

        let summary = pipeline
            .summarize(&Scope::Document("deed".into()))
            .await
            .unwrap();
        assert_eq!(summary, "a fine summary");
    }

    #[tokio::test]
    async fn suggested_questions_top_up_from_fallbacks() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config();
        let pipeline = Pipeline::open(
            config.clone(),
            tmp.path(),
            Arc::new(HashingEmbedder::new(config.embedding_dimension)),
            Arc::new(CannedGenerator::new("1. What is the term of the lease?")),
        )
        .unwrap();
        pipeline.ingest("lease", "the term is five years").await.unwrap();

        let questions = pipeline
            .suggested_questions(&Scope::Document("lease".into()), 3)
            .await
            .unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "What is the term of the lease?");
    }
}
