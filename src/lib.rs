//! lexrag - a retrieval-augmented generation core for legal document
//! question answering.
//!
//! lexrag ingests extracted document text, splits it into overlapping
//! chunks, embeds them through an external [`EmbeddingProvider`], and
//! indexes the vectors in [redb](https://github.com/cberner/redb). At query
//! time it retrieves the nearest passages, packs them into a bounded
//! context window, and drives an external [`GenerationService`] to produce
//! answers, summaries, glossaries, and drafting suggestions.
//!
//! The surrounding request layer, file-format parsing, and the language
//! model itself are external collaborators reached through traits; this
//! crate is the pipeline between them.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lexrag::{
//!     config::PipelineConfig,
//!     mock::{CannedGenerator, HashingEmbedder},
//!     pipeline::{Pipeline, Scope},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> lexrag::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let pipeline = Pipeline::open(
//!     config.clone(),
//!     std::path::Path::new("./data"),
//!     Arc::new(HashingEmbedder::new(config.embedding_dimension)),
//!     Arc::new(CannedGenerator::new("stub answer")),
//! )?;
//!
//! pipeline
//!     .ingest("lease.txt", "The deposit is refundable within 30 days.")
//!     .await?;
//!
//! let answer = pipeline.answer("When is the deposit refunded?").await?;
//! for citation in &answer.citations {
//!     println!("[{} §{}] {}", citation.document, citation.chunk_index, citation.text);
//! }
//! let glossary = pipeline.glossary(&Scope::Document("lease.txt".into())).await?;
//! # let _ = glossary;
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod doc_id;
pub mod document_store;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod generation;
pub mod glossary;
pub mod mock;
pub mod orchestrator;
pub mod pipeline;
pub mod retriever;
pub mod vector_index;

pub use chunking::Chunk;
pub use config::PipelineConfig;
pub use context::{ContextPassage, ContextWindow};
pub use doc_id::{ChunkId, DocumentId};
pub use document_store::DocumentStore;
pub use embedding::EmbeddingProvider;
pub use error::{Error, Result};
pub use extraction::{SourceFormat, TextExtractor};
pub use generation::GenerationService;
pub use orchestrator::TaskKind;
pub use pipeline::{Answer, Pipeline, Scope};
pub use retriever::Passage;
pub use vector_index::VectorIndex;
