use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt document: {0}")]
    CorruptFile(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("generation service error: {0}")]
    GenerationService(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("index/store inconsistency: {0}")]
    Inconsistency(String),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether the caller may reasonably retry the failed operation.
    ///
    /// True only for transient external-service failures. Configuration and
    /// consistency errors are permanent until the deployment is fixed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingService(_)
                | Self::GenerationService(_)
                | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::EmbeddingService("down".into()).is_retryable());
        assert!(Error::GenerationService("down".into()).is_retryable());
        assert!(
            Error::Timeout {
                operation: "embedding",
                timeout: Duration::from_secs(30),
            }
            .is_retryable()
        );

        assert!(!Error::Config("bad overlap".into()).is_retryable());
        assert!(
            !Error::DimensionMismatch {
                expected: 384,
                actual: 512,
            }
            .is_retryable()
        );
        assert!(!Error::not_found("chunk", "#42").is_retryable());
    }

    #[test]
    fn not_found_message_names_kind() {
        let err = Error::not_found("document", "lease-2024");
        assert_eq!(err.to_string(), "document not found: lease-2024");
    }
}
