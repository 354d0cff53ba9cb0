//! Embedding records and retrieval results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a stored embedding record.
pub type RecordId = String;

/// A stored (section_type, content, vector) tuple.
///
/// Content and vector are immutable once stored; only [`RecordMetadata`]
/// may be updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Record id (generated when empty on upsert)
    pub id: RecordId,

    /// Tag used for filtering, usually a section type identifier
    pub section_type: String,

    /// Where the content came from ("SOR #12 (2025-11-04)", building name)
    pub source_label: String,

    pub content: String,

    pub vector: Vec<f32>,

    #[serde(default)]
    pub metadata: RecordMetadata,

    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// Create a record with a fresh id.
    pub fn new(
        section_type: impl Into<String>,
        source_label: impl Into<String>,
        content: impl Into<String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            section_type: section_type.into(),
            source_label: source_label.into(),
            content: content.into(),
            vector,
            metadata: RecordMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Use a caller-chosen id (e.g. a building id).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Mutable metadata of a stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub tags: Vec<String>,

    /// Editorial quality score (0.0-1.0)
    pub quality_score: Option<f32>,

    /// Marked as a reference-quality style example
    #[serde(default)]
    pub is_exemplar: bool,
}

impl RecordMetadata {
    pub fn exemplar() -> Self {
        Self {
            is_exemplar: true,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(|t| t.into()).collect();
        self
    }

    pub fn with_quality(mut self, score: f32) -> Self {
        self.quality_score = Some(score);
        self
    }
}

/// One nearest-neighbour hit. Computed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub record_id: RecordId,
    pub content: String,

    /// Cosine similarity clamped to `[0.0, 1.0]`
    pub similarity: f32,

    pub section_type: String,

    pub source_label: String,
}

impl RetrievalResult {
    /// First 200 characters of the content, for previews.
    pub fn preview(&self) -> String {
        preview_text(&self.content)
    }
}

pub(crate) fn preview_text(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(200).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Section context used to build a retrieval query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub building_type: Option<String>,

    #[serde(default)]
    pub issues: Vec<String>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_building_type(mut self, building_type: impl Into<String>) -> Self {
        self.building_type = Some(building_type.into());
        self
    }

    pub fn with_issues(mut self, issues: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.issues = issues.into_iter().map(|i| i.into()).collect();
        self
    }
}
