//! Seam to the external embedding service.
//!
//! The provider is stateless from this crate's perspective: text in, fixed
//! dimension vector out. Both the ingestion path and the retriever go
//! through the timeout wrappers so a stalled service surfaces as
//! [`Error::Timeout`] instead of hanging a request, and a timed-out call
//! leaves no partial state behind.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// External embedding service mapping text to fixed-dimension vectors.
///
/// `embed_many` must preserve input order one-to-one; the default
/// implementation embeds sequentially, and batch-capable services should
/// override it to bound external round trips during ingestion.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Vector length this provider produces. Constant for the lifetime of
    /// the provider; must match the index's dimensionality.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Embed a single text with a deadline.
pub(crate) async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: std::time::Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "embedding",
            timeout,
        }),
    }
}

/// Embed a batch with a deadline covering the whole batch call.
pub(crate) async fn embed_many_with_timeout(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: std::time::Duration,
) -> Result<Vec<Vec<f32>>> {
    match tokio::time::timeout(timeout, provider.embed_many(texts)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "batch embedding",
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::HashingEmbedder;

    #[tokio::test]
    async fn embed_many_preserves_order() {
        let provider = HashingEmbedder::new(16);
        let texts = vec![
            "first clause".to_string(),
            "second clause".to_string(),
            "third clause".to_string(),
        ];

        let batch = provider.embed_many(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector, &provider.embed(text).await.unwrap());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        struct Stalled;

        #[async_trait]
        impl EmbeddingProvider for Stalled {
            fn dimension(&self) -> usize {
                4
            }

            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(vec![0.0; 4])
            }
        }

        let err =
            embed_with_timeout(&Stalled, "query", Duration::from_secs(1))
                .await
                .unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                operation: "embedding",
                ..
            }
        ));
        assert!(err.is_retryable());
    }
}
