//! In-memory embedding index for testing and development.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DraftingError, Result};
use crate::traits::index::{l2_normalize, unit_similarity, EmbeddingIndex};
use crate::types::retrieval::{EmbeddingRecord, RecordId, RecordMetadata, RetrievalResult};

/// In-memory embedding index.
///
/// Vectors are L2-normalized on upsert so a query is a dot product per
/// record. Records keep their insertion position (an `IndexMap`), which is
/// what breaks similarity ties. Data is lost on restart.
pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<IndexMap<RecordId, EmbeddingRecord>>,
}

impl MemoryIndex {
    /// Create an empty index for vectors of `dimension` floats.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(IndexMap::new()),
        }
    }

    /// Clear all stored records.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.read().len()
    }

    /// Ids of all records with the given tag, in insertion order.
    pub fn ids_for_section(&self, section_type: &str) -> Vec<RecordId> {
        self.read()
            .values()
            .filter(|r| r.section_type == section_type)
            .map(|r| r.id.clone())
            .collect()
    }

    // A panicked writer cannot leave a record half-written (inserts are a
    // single map operation), so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<RecordId, EmbeddingRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<RecordId, EmbeddingRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len != self.dimension {
            return Err(DraftingError::validation(format!(
                "vector has {len} dimensions, index expects {}",
                self.dimension
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingIndex for MemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, mut record: EmbeddingRecord) -> Result<RecordId> {
        if record.content.trim().is_empty() {
            return Err(DraftingError::validation("record content is empty"));
        }
        self.check_dimension(record.vector.len())?;
        record.vector = l2_normalize(&record.vector)
            .ok_or_else(|| DraftingError::validation("record vector has zero length"))?;
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let id = record.id.clone();
        let replaced = self.write().insert(id.clone(), record).is_some();
        debug!(record_id = %id, replaced, "Upserted embedding record");
        Ok(id)
    }

    async fn query(
        &self,
        vector: &[f32],
        section_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        self.check_dimension(vector.len())?;
        let query = l2_normalize(vector)
            .ok_or_else(|| DraftingError::validation("query vector has zero length"))?;

        let records = self.read();
        let mut scored: Vec<RetrievalResult> = records
            .values()
            .filter(|r| section_filter.map_or(true, |f| r.section_type == f))
            .map(|r| RetrievalResult {
                record_id: r.id.clone(),
                content: r.content.clone(),
                similarity: unit_similarity(&query, &r.vector),
                section_type: r.section_type.clone(),
                source_label: r.source_label.clone(),
            })
            .collect();
        drop(records);

        if scored.is_empty() {
            return Err(DraftingError::EmptyIndex {
                section_type: section_filter.unwrap_or("*").to_string(),
            });
        }

        // Stable sort keeps insertion order among equal similarities.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    async fn get(&self, id: &str) -> Result<Option<EmbeddingRecord>> {
        Ok(self.read().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        // shift_remove keeps the relative order of the remaining records
        self.write().shift_remove(id);
        Ok(())
    }

    async fn update_metadata(&self, id: &str, metadata: RecordMetadata) -> Result<bool> {
        match self.write().get_mut(id) {
            Some(record) => {
                record.metadata = metadata;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.record_count())
    }
}
