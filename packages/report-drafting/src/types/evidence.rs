//! Evidence items - the citable facts a draft may be built from.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::analysis::{DocumentType, Severity};

/// Where an evidence item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Image,
    Document,
    Narrative,
    Exemplar,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Narrative => "narrative",
            Self::Exemplar => "exemplar",
        };
        f.write_str(s)
    }
}

/// A discrete, source-traceable fact eligible for citation.
///
/// Every item is backed by exactly one upstream record (`source_id`).
/// Several items may share a source, e.g. one photo with three conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Id of the upstream image, document or narrative
    pub source_id: String,

    /// Human-readable citation string (filename, "Prior SOR dated ...")
    pub label: String,

    /// Confidence reported by the collaborator (0.0-1.0), if any
    pub confidence: Option<f32>,

    /// Variant-specific payload
    pub kind: EvidenceKind,
}

/// Variant payload of an [`EvidenceItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceKind {
    /// One observation or condition seen in a photograph
    ImageObservation {
        category: String,
        observation: String,
        severity: Option<Severity>,
        location: Option<String>,
    },

    /// One field extracted from a parsed document
    DocumentField {
        document_type: DocumentType,
        field: String,
        value: serde_json::Value,
    },

    /// Narrative written by the inspector
    NarrativeText { text: String },
}

impl EvidenceItem {
    /// Which collaborator produced this item.
    pub fn source_type(&self) -> SourceType {
        match self.kind {
            EvidenceKind::ImageObservation { .. } => SourceType::Image,
            EvidenceKind::DocumentField { .. } => SourceType::Document,
            EvidenceKind::NarrativeText { .. } => SourceType::Narrative,
        }
    }

    /// Text rendered into the generation request.
    pub fn content(&self) -> String {
        match &self.kind {
            EvidenceKind::ImageObservation {
                category,
                observation,
                severity,
                location,
            } => {
                let mut text = if category.is_empty() {
                    observation.clone()
                } else {
                    format!("{category}: {observation}")
                };
                if let Some(severity) = severity {
                    text.push_str(&format!(" (severity: {severity})"));
                }
                if let Some(location) = location.as_deref().filter(|l| !l.is_empty()) {
                    text.push_str(&format!(" at {location}"));
                }
                text
            }
            EvidenceKind::DocumentField { field, value, .. } => {
                format!("{}: {}", field, render_value(value))
            }
            EvidenceKind::NarrativeText { text } => text.clone(),
        }
    }

    /// Cut the rendered content to at most `max_chars` characters.
    ///
    /// Shortens the free text (observation, field value or narrative) and
    /// marks the cut with `...`. Returns false when nothing was cut.
    pub fn truncate_content(&mut self, max_chars: usize) -> bool {
        let len = self.content().chars().count();
        if len <= max_chars {
            return false;
        }
        let excess = len - max_chars;

        match &mut self.kind {
            EvidenceKind::ImageObservation { observation, .. } => {
                let keep = observation.chars().count().saturating_sub(excess);
                *observation = truncate_chars(observation, keep);
            }
            EvidenceKind::DocumentField { value, .. } => {
                let text = render_value(value);
                let keep = text.chars().count().saturating_sub(excess);
                *value = serde_json::Value::String(truncate_chars(&text, keep));
            }
            EvidenceKind::NarrativeText { text } => {
                let keep = text.chars().count().saturating_sub(excess);
                *text = truncate_chars(text, keep);
            }
        }

        // a long location can still overflow a cut observation
        if self.content().chars().count() > max_chars {
            if let EvidenceKind::ImageObservation { location, .. } = &mut self.kind {
                *location = None;
            }
        }
        true
    }

    /// Confidence used for ranking. Items without one rank as certain,
    /// since documents and narrative are direct records.
    pub fn ranking_confidence(&self) -> f32 {
        self.confidence.unwrap_or(1.0)
    }
}

/// First `max_chars` characters of `text`, ending in `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars < 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut cut: String = text.chars().take(max_chars - 3).collect();
    cut.push_str("...");
    cut
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) if items.iter().all(|v| v.is_string()) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

/// A per-item failure that was skipped during collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionWarning {
    pub source_id: String,
    pub source_type: SourceType,
    pub message: String,
}

/// Output of evidence collection: ordered items plus skipped-item warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedEvidence {
    /// Images first, then documents, then narrative
    pub items: Vec<EvidenceItem>,
    pub warnings: Vec<CollectionWarning>,
}

impl CollectedEvidence {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
