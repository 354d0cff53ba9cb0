//! Model collaborators: vision, document parsing, embeddings, generation.
//!
//! Each trait is a narrow capability so one vendor implementation can be
//! swapped for another (or for a deterministic test double) without
//! touching the pipeline.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{
    analysis::{DocumentType, ParsedFields, VisionAnalysis},
    draft::PromptPayload,
};

/// Turns a photograph into structured observations.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Analyze image bytes (`mime_type` e.g. `image/jpeg`).
    ///
    /// Fails with `DraftingError::VisionService` on collaborator failure.
    async fn analyze(&self, image: &[u8], mime_type: &str) -> Result<VisionAnalysis>;
}

/// Extracts structured fields from a project document.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse document bytes into fields keyed by the type's schema.
    ///
    /// Fails with `DraftingError::Parse` on collaborator failure.
    async fn parse(&self, document: &[u8], doc_type: &DocumentType) -> Result<ParsedFields>;
}

/// Maps text to a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output dimensionality (e.g. 1536 for text-embedding-3-small).
    fn dimension(&self) -> usize;

    /// Fails with `DraftingError::EmbeddingService` on collaborator failure.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts. Default calls `embed` sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Produces raw text for a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> String;

    /// Generate a completion within `timeout`.
    ///
    /// Fails with `DraftingError::GenerationService` or
    /// `DraftingError::Timeout`.
    async fn generate(&self, payload: &PromptPayload, timeout: Duration) -> Result<String>;
}
