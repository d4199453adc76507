//! redb-backed vector index over chunk embeddings.
//!
//! One table keyed by chunk numeric ID. Binary format per entry:
//! - 4 bytes: chunk index within the document (u32 LE)
//! - 4 bytes: vector dimension D (u32 LE)
//! - 4 bytes: document identifier length N (u32 LE)
//! - N bytes: document identifier (UTF-8)
//! - D * 4 bytes: f32 LE vector components
//!
//! The similarity metric is cosine, fixed for the lifetime of an index
//! instance. Search is a full scan — corpora here are per-matter document
//! sets, not web-scale collections — and every mutation runs in its own
//! redb write transaction, so readers never observe a partially written or
//! partially removed entry.

use std::path::Path;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    doc_id::ChunkId,
    error::{Error, Result},
};

const ENTRIES: TableDefinition<u64, &[u8]> =
    TableDefinition::new("vector_entries");

/// Header size: chunk index + dimension + document identifier length.
const HEADER_SIZE: usize = 12;

/// A vector index entry queued for insertion.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    /// Caller-assigned identifier of the owning document.
    pub document: String,
    /// Chunk ordinal within the document.
    pub chunk_index: u32,
    pub vector: Vec<f32>,
}

/// A search hit before hydration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub chunk_id: ChunkId,
    pub document: String,
    pub chunk_index: u32,
    pub score: f32,
}

/// Persistent index of chunk embeddings with k-nearest-neighbor search.
pub struct VectorIndex {
    db: Database,
    dimension: usize,
}

impl VectorIndex {
    /// Open or create an index at the given path with a fixed
    /// dimensionality.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use lexrag::vector_index::VectorIndex;
    ///
    /// let index = VectorIndex::open(&tmp.path().join("index.redb"), 4).unwrap();
    /// assert_eq!(index.len().unwrap(), 0);
    /// ```
    pub fn open(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "vector index dimension must be positive".into(),
            ));
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(ENTRIES)?;
        txn.commit()?;

        Ok(Self { db, dimension })
    }

    /// Dimensionality this index was opened with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert one entry.
    pub fn add(&self, entry: &IndexEntry) -> Result<()> {
        self.add_batch(std::slice::from_ref(entry))
    }

    /// Insert a batch of entries in a single transaction, so a document's
    /// chunks become visible to readers all at once.
    pub fn add_batch(&self, entries: &[IndexEntry]) -> Result<()> {
        for entry in entries {
            if entry.vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.vector.len(),
                });
            }
        }
        if entries.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES)?;
            for entry in entries {
                let name = entry.document.as_bytes();
                let byte_len = HEADER_SIZE
                    + name.len()
                    + std::mem::size_of_val(entry.vector.as_slice());

                let mut guard =
                    table.insert_reserve(entry.chunk_id.as_u64(), byte_len)?;
                let dest = guard.as_mut();
                dest[0..4].copy_from_slice(&entry.chunk_index.to_le_bytes());
                dest[4..8].copy_from_slice(
                    &(self.dimension as u32).to_le_bytes(),
                );
                dest[8..12]
                    .copy_from_slice(&(name.len() as u32).to_le_bytes());
                dest[HEADER_SIZE..HEADER_SIZE + name.len()]
                    .copy_from_slice(name);
                dest[HEADER_SIZE + name.len()..]
                    .copy_from_slice(bytemuck::cast_slice(&entry.vector));
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Return the `min(k, len)` entries nearest to `query` by cosine
    /// similarity, score-descending, ties broken by ascending document
    /// identifier then ascending chunk index.
    ///
    /// An empty index yields an empty result, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;

        let mut scored = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            let (chunk_index, document, vector) =
                decode_entry(value.value(), self.dimension)?;
            scored.push(ScoredEntry {
                chunk_id: ChunkId::from_u64(key.value()),
                document,
                chunk_index,
                score: cosine_similarity(query, &vector),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.cmp(&b.document))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Remove every entry belonging to `document`. Idempotent; returns the
    /// number of entries removed.
    pub fn remove(&self, document: &str) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(ENTRIES)?;

            let mut keys = Vec::new();
            for item in table.iter()? {
                let (key, value) = item?;
                if entry_document(value.value())? == document {
                    keys.push(key.value());
                }
            }
            for key in &keys {
                table.remove(key)?;
            }
            keys.len()
        };
        txn.commit()?;

        if removed > 0 {
            tracing::debug!(document, removed, "removed document vectors");
        }
        Ok(removed)
    }

    /// Remove specific chunks in a single transaction. Used to unwind a
    /// partially indexed document.
    pub fn remove_chunks(&self, chunk_ids: &[ChunkId]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES)?;
            for chunk_id in chunk_ids {
                table.remove(chunk_id.as_u64())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Number of entries in the index.
    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 when either has zero
/// norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn entry_document(bytes: &[u8]) -> Result<String> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::Inconsistency(
            "vector entry shorter than header".into(),
        ));
    }
    let name_len =
        u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let name_end = HEADER_SIZE + name_len;
    if bytes.len() < name_end {
        return Err(Error::Inconsistency(
            "vector entry truncated inside document identifier".into(),
        ));
    }
    String::from_utf8(bytes[HEADER_SIZE..name_end].to_vec()).map_err(|_| {
        Error::Inconsistency("vector entry identifier is not UTF-8".into())
    })
}

fn decode_entry(
    bytes: &[u8],
    expected_dim: usize,
) -> Result<(u32, String, Vec<f32>)> {
    let document = entry_document(bytes)?;
    let chunk_index = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let dim = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    if dim != expected_dim {
        return Err(Error::DimensionMismatch {
            expected: expected_dim,
            actual: dim,
        });
    }

    let name_end = HEADER_SIZE + document.len();
    let payload = &bytes[name_end..];
    if payload.len() != dim * 4 {
        return Err(Error::Inconsistency(format!(
            "vector entry payload is {} bytes, expected {}",
            payload.len(),
            dim * 4
        )));
    }
    // Copying decode; the payload's alignment inside the redb page is
    // arbitrary.
    let vector: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
    Ok((chunk_index, document, vector))
}
