//! Embedding index trait and vector helpers.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::retrieval::{EmbeddingRecord, RecordId, RecordMetadata, RetrievalResult};

/// Stores `(section_type, content, vector)` records and answers
/// nearest-neighbour queries.
///
/// Implementations must:
/// - reject records whose vector length differs from [`dimension`](Self::dimension)
///   or whose content is blank (`DraftingError::Validation`)
/// - return query results in non-increasing similarity, ties in insertion order
/// - treat a same-id upsert as last-writer-wins
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Fixed vector length of this index.
    fn dimension(&self) -> usize;

    /// Insert or replace a record. Returns its id.
    async fn upsert(&self, record: EmbeddingRecord) -> Result<RecordId>;

    /// Up to `top_k` most similar records, optionally restricted to one tag.
    ///
    /// Fails with `DraftingError::EmptyIndex` when the filtered candidate
    /// set is empty.
    async fn query(
        &self,
        vector: &[f32],
        section_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>>;

    /// Fetch one record by id.
    async fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>>;

    /// Remove a record. Unknown ids are not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Replace a record's mutable metadata. Returns false for unknown ids.
    async fn update_metadata(&self, id: &str, metadata: RecordMetadata) -> Result<bool>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Scale a vector to unit length. `None` for a zero (or non-finite) vector.
pub fn l2_normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(vector.iter().map(|x| x / norm).collect())
}

/// Dot product of two unit vectors, clamped to `[0.0, 1.0]`.
pub fn unit_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(0.0, 1.0)
}
