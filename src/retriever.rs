//! Query-time retrieval: embed, search, filter, deduplicate, hydrate.

use crate::{
    config::PipelineConfig,
    doc_id::ChunkId,
    document_store::DocumentStore,
    embedding::{self, EmbeddingProvider},
    error::{Error, Result},
    vector_index::{ScoredEntry, VectorIndex},
};

/// A retrieved passage, hydrated and ready for context assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub chunk_id: ChunkId,
    pub document: String,
    pub chunk_index: u32,
    pub text: String,
    pub score: f32,
}

/// Retrieve the top `k` passages for `query`.
///
/// Overfetches `k * overfetch_factor` candidates to compensate for floor
/// filtering and deduplication, keeps only candidates scoring at least
/// `floor`, collapses overlapping chunks of the same document down to the
/// best-scoring one, and hydrates the survivors through the document
/// store. A hydration miss means the index and store disagree — an
/// ingestion bug, not caller error — so it is logged at error severity and
/// surfaced as [`Error::Inconsistency`].
pub async fn retrieve(
    query: &str,
    k: usize,
    floor: f32,
    provider: &dyn EmbeddingProvider,
    index: &VectorIndex,
    store: &DocumentStore,
    config: &PipelineConfig,
) -> Result<Vec<Passage>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let query_vector = embedding::embed_with_timeout(
        provider,
        query,
        config.request_timeout,
    )
    .await?;

    let candidates = index
        .search(&query_vector, k.saturating_mul(config.overfetch_factor))?;

    let mut kept: Vec<ScoredEntry> = Vec::with_capacity(k);
    for candidate in candidates {
        if candidate.score < floor {
            // Candidates are score-descending; everything after is below
            // the floor too.
            break;
        }
        let overlaps_kept = kept.iter().any(|existing| {
            existing.document == candidate.document
                && chunks_overlap(
                    existing.chunk_index,
                    candidate.chunk_index,
                    config,
                )
        });
        if !overlaps_kept {
            kept.push(candidate);
        }
        if kept.len() == k {
            break;
        }
    }

    let mut passages = Vec::with_capacity(kept.len());
    for entry in kept {
        let text = match store.get_chunk_text(entry.chunk_id) {
            Ok(text) => text,
            Err(Error::NotFound { .. }) => {
                tracing::error!(
                    chunk = %entry.chunk_id,
                    document = entry.document,
                    "vector index references a chunk missing from the \
                     document store"
                );
                return Err(Error::Inconsistency(format!(
                    "index entry {} has no stored chunk",
                    entry.chunk_id
                )));
            }
            Err(other) => return Err(other),
        };
        passages.push(Passage {
            chunk_id: entry.chunk_id,
            document: entry.document,
            chunk_index: entry.chunk_index,
            text,
            score: entry.score,
        });
    }

    tracing::debug!(k, returned = passages.len(), "retrieval complete");
    Ok(passages)
}

/// Two chunks of one document share text iff their windows are closer than
/// one chunk size: chunk `i` spans `[i*step, i*step + chunk_size)`.
fn chunks_overlap(a: u32, b: u32, config: &PipelineConfig) -> bool {
    let distance = a.abs_diff(b) as usize;
    distance * config.chunk_step() < config.chunk_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunking::chunk_text,
        doc_id::{ChunkId, DocumentId},
        extraction::SourceFormat,
        mock::HashingEmbedder,
        vector_index::IndexEntry,
    };

    fn fixture_config() -> PipelineConfig {
        PipelineConfig {
            chunk_size: 20,
            chunk_overlap: 5,
            embedding_dimension: 64,
            similarity_floor: 0.0,
            ..Default::default()
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        index: VectorIndex,
        store: DocumentStore,
        provider: HashingEmbedder,
        config: PipelineConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let config = fixture_config();
            let index = VectorIndex::open(
                &tmp.path().join("index.redb"),
                config.embedding_dimension,
            )
            .unwrap();
            let store =
                DocumentStore::open(&tmp.path().join("store.redb")).unwrap();
            let provider = HashingEmbedder::new(config.embedding_dimension);
            Self {
                _tmp: tmp,
                index,
                store,
                provider,
                config,
            }
        }

        async fn ingest(&self, name: &str, text: &str) {
            let chunks = chunk_text(
                text,
                self.config.chunk_size,
                self.config.chunk_overlap,
            )
            .unwrap();
            let id = DocumentId::new(name);
            self.store
                .put(&id, SourceFormat::PlainText, text, &chunks)
                .unwrap();
            let mut entries = Vec::new();
            for chunk in &chunks {
                entries.push(IndexEntry {
                    chunk_id: ChunkId::new(&id, chunk.index),
                    document: name.to_string(),
                    chunk_index: chunk.index as u32,
                    vector: self.provider.embed(&chunk.text).await.unwrap(),
                });
            }
            self.index.add_batch(&entries).unwrap();
        }

        async fn retrieve(
            &self,
            query: &str,
            k: usize,
            floor: f32,
        ) -> Result<Vec<Passage>> {
            retrieve(
                query,
                k,
                floor,
                &self.provider,
                &self.index,
                &self.store,
                &self.config,
            )
            .await
        }
    }

    #[tokio::test]
    async fn returns_hydrated_passages_in_score_order() {
        let fx = Fixture::new();
        fx.ingest("rent", "rent is payable monthly").await;
        fx.ingest("term", "notice ends the lease").await;

        let passages = fx.retrieve("when is rent payable", 2, 0.0).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].document, "rent");
        assert_eq!(passages[0].text, "rent is payable mont");
        assert!(passages[0].score >= passages[1].score);
    }

    #[tokio::test]
    async fn floor_filters_unrelated_passages() {
        let fx = Fixture::new();
        fx.ingest("rent", "rent is payable monthly").await;
        fx.ingest("pasta", "boil water add salt").await;

        let passages =
            fx.retrieve("when is rent payable", 5, 0.35).await.unwrap();
        assert!(!passages.is_empty());
        assert!(passages.iter().all(|p| p.score >= 0.35));
        assert!(passages.iter().all(|p| p.document == "rent"));
    }

    #[tokio::test]
    async fn overlapping_chunks_deduplicate_to_best() {
        let fx = Fixture::new();
        // Long enough to chunk; adjacent chunks share 5-char overlaps.
        fx.ingest("lease", "the lease ends when notice is given in writing")
            .await;

        let passages = fx.retrieve("notice in writing", 4, 0.0).await.unwrap();
        // No two returned chunks of the same document may overlap.
        for (i, a) in passages.iter().enumerate() {
            for b in passages.iter().skip(i + 1) {
                if a.document == b.document {
                    let distance = a.chunk_index.abs_diff(b.chunk_index);
                    assert!(
                        distance as usize * fx.config.chunk_step()
                            >= fx.config.chunk_size,
                        "chunks {} and {} overlap",
                        a.chunk_index,
                        b.chunk_index
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn zero_k_and_empty_index_yield_empty() {
        let fx = Fixture::new();
        assert!(fx.retrieve("anything", 0, 0.0).await.unwrap().is_empty());
        assert!(fx.retrieve("anything", 3, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hydration_miss_is_an_inconsistency() {
        let fx = Fixture::new();
        // Index an entry with no backing chunk in the store.
        let id = DocumentId::new("ghost");
        fx.index
            .add(&IndexEntry {
                chunk_id: ChunkId::new(&id, 0),
                document: "ghost".to_string(),
                chunk_index: 0,
                vector: fx.provider.embed("ghost text").await.unwrap(),
            })
            .unwrap();

        let err = fx.retrieve("ghost text", 1, 0.0).await.unwrap_err();
        assert!(matches!(err, Error::Inconsistency(_)));
        assert!(!err.is_retryable());
    }
}
