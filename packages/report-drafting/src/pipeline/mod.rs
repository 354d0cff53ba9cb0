//! Drafting pipeline: collect, retrieve, assemble, synthesize, classify, rewrite.

pub mod assemble;
pub mod citations;
pub mod classify;
pub mod collect;
pub mod drafter;
pub mod prompts;
pub mod retrieval;
pub mod rewrite;
pub mod synthesize;

use std::future::Future;
use std::time::Duration;

use crate::error::{DraftingError, Result};

/// Run a collaborator call under a deadline.
///
/// Expiry surfaces as `DraftingError::Timeout` naming `operation`.
pub(crate) async fn with_deadline<T, F>(operation: &str, deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(DraftingError::Timeout {
            operation: operation.to_string(),
            after_ms: deadline.as_millis() as u64,
        }),
    }
}
