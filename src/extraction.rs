//! Seam to the external text-extraction service.
//!
//! File parsing is not this crate's job: the extractor receives raw file
//! bytes plus a format tag and hands back plain text (or a rejection). The
//! request layer picks the implementation; [`crate::mock::PlainTextExtractor`]
//! covers tests and plain-text deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Source format tag carried on a [`DocumentRecord`](crate::document_store::DocumentRecord).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Docx,
    PlainText,
}

impl SourceFormat {
    /// Map a lowercase file extension to a format tag.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" | "md" => Some(Self::PlainText),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "plaintext",
        };
        f.write_str(tag)
    }
}

/// External text-extraction service.
///
/// Implementations fail with [`Error::UnsupportedFormat`](crate::Error::UnsupportedFormat)
/// for formats they cannot handle and [`Error::CorruptFile`](crate::Error::CorruptFile)
/// for files that do not parse; either way the request is rejected before
/// any ingestion state is touched.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(
        &self,
        bytes: &[u8],
        format: SourceFormat,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(SourceFormat::from_extension("pdf"), Some(SourceFormat::Pdf));
        assert_eq!(
            SourceFormat::from_extension("docx"),
            Some(SourceFormat::Docx)
        );
        assert_eq!(
            SourceFormat::from_extension("txt"),
            Some(SourceFormat::PlainText)
        );
        assert_eq!(SourceFormat::from_extension("exe"), None);
    }

    #[test]
    fn display_tags() {
        assert_eq!(SourceFormat::Pdf.to_string(), "pdf");
        assert_eq!(SourceFormat::PlainText.to_string(), "plaintext");
    }
}
