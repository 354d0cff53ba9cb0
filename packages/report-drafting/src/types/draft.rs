//! Generation requests and the drafts synthesized from them.

use serde::{Deserialize, Serialize};

use super::evidence::{EvidenceItem, SourceType};
use super::retrieval::RetrievalResult;
use super::section::{ProjectContext, SectionType};

/// Everything the generation collaborator needs to draft one section.
///
/// Produced by the assembler; evidence and exemplars are already capped and
/// in their final citation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub section_type: SectionType,
    pub project_context: ProjectContext,

    /// Cited as `E1..En`, in this order
    pub evidence: Vec<EvidenceItem>,

    /// Cited as `X1..Xn`, highest similarity first
    pub exemplars: Vec<RetrievalResult>,

    /// Fixed policy text (tone, voice, citation and hedging rules)
    pub instructions: String,

    /// SHA-256 of `instructions`, for audit trails
    pub policy_hash: String,

    /// How many items the caps removed
    #[serde(default)]
    pub truncated: Truncation,
}

/// Items dropped or shortened by the request size caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub evidence_dropped: usize,
    pub exemplars_dropped: usize,

    /// Items kept with their text cut to fit the prompt budget
    #[serde(default)]
    pub evidence_shortened: usize,
    #[serde(default)]
    pub exemplars_shortened: usize,
}

impl Truncation {
    /// Whether the caps changed anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl GenerationRequest {
    /// Citation tag of the evidence item at `index`.
    pub fn evidence_tag(index: usize) -> String {
        format!("E{}", index + 1)
    }

    /// Citation tag of the exemplar at `index`.
    pub fn exemplar_tag(index: usize) -> String {
        format!("X{}", index + 1)
    }

    /// True when either the evidence or the style exemplars are missing.
    pub fn is_generic(&self) -> bool {
        self.evidence.is_empty() || self.exemplars.is_empty()
    }
}

/// Vendor-neutral prompt handed to the generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
}

/// A provenance entry of a draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceReference {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub source_id: String,
    pub label: String,
}

/// A citation marker the model emitted that matched nothing supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedCitation {
    /// The reference text inside the marker
    pub reference: String,
}

/// Outcome of a drafting attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DraftStatus {
    /// Drafted from evidence with style exemplars.
    #[default]
    Drafted,

    /// Drafted, but without evidence or exemplars to lean on.
    ///
    /// Expect low confidence and a template-like result.
    Generic,

    /// Synthesis failed after retry; left empty for human completion.
    Failed { reason: String },
}

/// A drafted report section with provenance.
///
/// Every `[Evidence: ...]` marker left in `content` resolves to an entry of
/// `evidence_references`. Supplied evidence that the model never cited is
/// listed in `unused_evidence` instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSection {
    pub section_type: SectionType,
    pub content: String,

    /// Cited sources, in request order (evidence first, then exemplars)
    pub evidence_references: Vec<EvidenceReference>,

    /// Provided but never cited
    #[serde(default)]
    pub unused_evidence: Vec<EvidenceReference>,

    /// Markers stripped because they matched nothing
    #[serde(default)]
    pub unmatched_citations: Vec<UnmatchedCitation>,

    /// Best-effort heuristic in `[0.0, 1.0]`
    pub confidence: f32,

    #[serde(default)]
    pub status: DraftStatus,
}

impl DraftSection {
    /// An empty, explicitly failed section.
    pub fn failed(section_type: SectionType, reason: impl Into<String>) -> Self {
        Self {
            section_type,
            content: String::new(),
            evidence_references: Vec::new(),
            unused_evidence: Vec::new(),
            unmatched_citations: Vec::new(),
            confidence: 0.0,
            status: DraftStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, DraftStatus::Failed { .. })
    }

    /// Whether a human should look at this section before it ships.
    pub fn needs_review(&self, min_confidence: f32) -> bool {
        self.is_failed()
            || self.confidence < min_confidence
            || !self.unmatched_citations.is_empty()
            || !self.unused_evidence.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_draft_is_empty() {
        let draft = DraftSection::failed(SectionType::BudgetSummary, "timeout");
        assert!(draft.is_failed());
        assert!(draft.content.is_empty());
        assert_eq!(draft.confidence, 0.0);
        assert!(draft.needs_review(0.5));
    }

    #[test]
    fn test_tags_are_one_based() {
        assert_eq!(GenerationRequest::evidence_tag(0), "E1");
        assert_eq!(GenerationRequest::exemplar_tag(4), "X5");
    }

    #[test]
    fn test_reference_serializes_type_field() {
        let reference = EvidenceReference {
            source_type: SourceType::Image,
            source_id: "img-1".into(),
            label: "IMG_001.jpg".into(),
        };
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["type"], "image");
    }

    #[test]
    fn test_generic_when_either_input_is_missing() {
        use crate::types::evidence::EvidenceKind;

        let mut request = GenerationRequest {
            section_type: SectionType::SiteObservations,
            project_context: ProjectContext::new("P"),
            evidence: vec![EvidenceItem {
                source_id: "n".into(),
                label: "Narrative".into(),
                confidence: None,
                kind: EvidenceKind::NarrativeText { text: "Crew on site.".into() },
            }],
            exemplars: Vec::new(),
            instructions: String::new(),
            policy_hash: String::new(),
            truncated: Truncation::default(),
        };
        assert!(request.is_generic());

        request.exemplars.push(RetrievalResult {
            record_id: "r1".into(),
            content: "It was observed that...".into(),
            similarity: 0.8,
            section_type: "site_observations".into(),
            source_label: "SOR #1".into(),
        });
        assert!(!request.is_generic());

        request.evidence.clear();
        assert!(request.is_generic());
    }
}
