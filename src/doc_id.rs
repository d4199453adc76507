use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable document identifier derived from the caller-assigned name.
///
/// The numeric form keys the redb tables; the name is what callers pass to
/// `ingest`, `remove_document` and friends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentId {
    /// The caller-assigned identifier (e.g. a filename or filename+hash).
    pub name: String,
    /// The numeric ID used as the key in redb tables.
    pub numeric: u64,
}

impl DocumentId {
    /// Derive a stable document ID from the caller's identifier.
    pub fn new(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self {
            name: name.to_string(),
            numeric: hasher.finish(),
        }
    }

    /// Short hex form for log lines.
    pub fn short_hex(&self) -> String {
        format!("{:016x}", self.numeric)[..6].to_string()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Identifier of a single chunk: the parent document's numeric ID with the
/// chunk ordinal packed into the high 16 bits.
///
/// Chunk 0 of a document shares the document's numeric ID. The packing caps
/// a document at [`ChunkId::MAX_INDEX`] chunks; ingestion enforces the cap.
///
/// # Examples
///
/// ```
/// use lexrag::doc_id::{ChunkId, DocumentId};
///
/// let doc = DocumentId::new("lease.pdf");
/// let first = ChunkId::new(&doc, 0);
/// assert_eq!(first.as_u64(), doc.numeric);
///
/// let third = ChunkId::new(&doc, 2);
/// assert_eq!(third.document_numeric(), doc.numeric);
/// assert_eq!(third.chunk_index(), 2);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Highest chunk ordinal a document may have.
    pub const MAX_INDEX: usize = u16::MAX as usize;

    pub fn new(document: &DocumentId, chunk_index: usize) -> Self {
        debug_assert!(chunk_index <= Self::MAX_INDEX);
        if chunk_index == 0 {
            Self(document.numeric)
        } else {
            Self(document.numeric ^ ((chunk_index as u64) << 48))
        }
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn chunk_index(self) -> usize {
        (self.0 >> 48) as usize
    }

    /// Recover the parent document's numeric ID.
    ///
    /// Only exact when the document's own high bits carried no ordinal,
    /// which holds for every ID produced by [`ChunkId::new`] with the
    /// ordinal re-applied; callers needing the document should use the
    /// denormalized metadata stored alongside the vector instead.
    pub fn document_numeric(self) -> u64 {
        let index = self.chunk_index() as u64;
        if index == 0 {
            self.0
        } else {
            self.0 ^ (index << 48)
        }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = DocumentId::new("contract.pdf");
        let b = DocumentId::new("contract.pdf");
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_differ() {
        let a = DocumentId::new("contract.pdf");
        let b = DocumentId::new("lease.pdf");
        assert_ne!(a.numeric, b.numeric);
    }

    #[test]
    fn chunk_zero_is_document_id() {
        let doc = DocumentId::new("contract.pdf");
        assert_eq!(ChunkId::new(&doc, 0).as_u64(), doc.numeric);
    }

    #[test]
    fn chunk_id_roundtrip() {
        let doc = DocumentId::new("contract.pdf");
        for index in [0usize, 1, 17, ChunkId::MAX_INDEX] {
            let id = ChunkId::new(&doc, index);
            assert_eq!(id.chunk_index(), index);
            assert_eq!(id.document_numeric(), doc.numeric);
        }
    }

    #[test]
    fn chunk_ids_within_document_are_distinct() {
        let doc = DocumentId::new("contract.pdf");
        let ids: Vec<u64> =
            (0..100).map(|i| ChunkId::new(&doc, i).as_u64()).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn short_hex_is_six_chars() {
        assert_eq!(DocumentId::new("contract.pdf").short_hex().len(), 6);
    }
}
