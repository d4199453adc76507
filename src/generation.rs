//! Seam to the external text-generation service.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// External completion service: prompt in, generated text out.
///
/// The core never retries a failed call; bounded retry with backoff is a
/// policy the caller layers on top.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Run a completion with a deadline.
pub(crate) async fn complete_with_timeout(
    service: &dyn GenerationService,
    prompt: &str,
    timeout: std::time::Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, service.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "generation",
            timeout,
        }),
    }
}
