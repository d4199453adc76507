//! redb-backed store of documents and their chunks.
//!
//! The vector index carries only enough metadata to point back here; this
//! store is the source of truth for hydrating search hits into readable
//! passages. Records are serde_json values since chunk text is arbitrary.

use std::path::Path;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::{
    chunking::Chunk,
    doc_id::{ChunkId, DocumentId},
    error::{Error, Result},
    extraction::SourceFormat,
};

const DOCUMENTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("documents");
const CHUNKS: TableDefinition<u64, &[u8]> = TableDefinition::new("chunks");

/// A stored document: the caller's identifier, the raw extracted text, its
/// source format, and how many chunks it was split into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub name: String,
    pub format: SourceFormat,
    pub text: String,
    pub chunk_count: u32,
}

/// A stored chunk with traceability back into its document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub document: String,
    pub index: u32,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub overlap_with_previous: usize,
}

/// Persistent document/chunk store.
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(CHUNKS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Store a document and its chunks in one transaction, replacing any
    /// previous version (including chunks the new version no longer has).
    pub fn put(
        &self,
        id: &DocumentId,
        format: SourceFormat,
        text: &str,
        chunks: &[Chunk],
    ) -> Result<Vec<ChunkId>> {
        let record = DocumentRecord {
            name: id.name.clone(),
            format,
            text: text.to_string(),
            chunk_count: chunks.len() as u32,
        };
        let record_bytes = encode(&record)?;

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let txn = self.db.begin_write()?;
        {
            let mut documents = txn.open_table(DOCUMENTS)?;
            let mut chunk_table = txn.open_table(CHUNKS)?;

            // Replace semantics: drop the previous version's chunks first so
            // a shrinking document leaves no orphans behind.
            if let Some(previous) = documents.get(id.numeric)? {
                let old: DocumentRecord = decode(previous.value())?;
                drop(previous);
                for index in 0..old.chunk_count {
                    chunk_table
                        .remove(ChunkId::new(id, index as usize).as_u64())?;
                }
            }

            documents.insert(id.numeric, record_bytes.as_slice())?;
            for chunk in chunks {
                let chunk_id = ChunkId::new(id, chunk.index);
                let stored = StoredChunk {
                    document: id.name.clone(),
                    index: chunk.index as u32,
                    text: chunk.text.clone(),
                    start_char: chunk.start_char,
                    end_char: chunk.end_char,
                    overlap_with_previous: chunk.overlap_with_previous,
                };
                chunk_table
                    .insert(chunk_id.as_u64(), encode(&stored)?.as_slice())?;
                chunk_ids.push(chunk_id);
            }
        }
        txn.commit()?;
        Ok(chunk_ids)
    }

    pub fn get_document(&self, name: &str) -> Result<DocumentRecord> {
        let id = DocumentId::new(name);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        match table.get(id.numeric)? {
            Some(bytes) => decode(bytes.value()),
            None => Err(Error::not_found("document", name)),
        }
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        let id = DocumentId::new(name);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.get(id.numeric)?.is_some())
    }

    pub fn get_chunk(&self, chunk_id: ChunkId) -> Result<StoredChunk> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        match table.get(chunk_id.as_u64())? {
            Some(bytes) => decode(bytes.value()),
            None => Err(Error::not_found("chunk", chunk_id.to_string())),
        }
    }

    pub fn get_chunk_text(&self, chunk_id: ChunkId) -> Result<String> {
        Ok(self.get_chunk(chunk_id)?.text)
    }

    /// All chunks of a document in ordinal order.
    pub fn chunks_for_document(
        &self,
        name: &str,
    ) -> Result<Vec<StoredChunk>> {
        let record = self.get_document(name)?;
        let id = DocumentId::new(name);

        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let mut chunks = Vec::with_capacity(record.chunk_count as usize);
        for index in 0..record.chunk_count {
            let chunk_id = ChunkId::new(&id, index as usize);
            match table.get(chunk_id.as_u64())? {
                Some(bytes) => chunks.push(decode(bytes.value())?),
                None => {
                    return Err(Error::Inconsistency(format!(
                        "document {name} is missing chunk {index}"
                    )));
                }
            }
        }
        Ok(chunks)
    }

    /// Delete a document and all its chunks. Idempotent; returns whether
    /// the document existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let id = DocumentId::new(name);
        let txn = self.db.begin_write()?;
        let existed = {
            let mut documents = txn.open_table(DOCUMENTS)?;
            let mut chunk_table = txn.open_table(CHUNKS)?;

            match documents.remove(id.numeric)? {
                Some(record) => {
                    let old: DocumentRecord = decode(record.value())?;
                    drop(record);
                    for index in 0..old.chunk_count {
                        chunk_table.remove(
                            ChunkId::new(&id, index as usize).as_u64(),
                        )?;
                    }
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        Ok(existed)
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.len()?)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| Error::Inconsistency(format!("record encode: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Inconsistency(format!("record decode: {e}")))
}
