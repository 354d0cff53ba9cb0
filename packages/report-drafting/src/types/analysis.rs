//! Shapes returned by the vision and document-parser collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured observation of one site photograph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionAnalysis {
    /// Free-text description in engineering language
    #[serde(default)]
    pub description: String,

    /// residential | commercial | industrial | mixed_use | unknown
    #[serde(default)]
    pub building_type: Option<String>,

    /// foundation | framing | exterior | interior | finishing | complete
    #[serde(default)]
    pub construction_phase: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub materials: Vec<String>,

    #[serde(default)]
    pub safety_issues: Vec<String>,

    #[serde(default)]
    pub location_clues: Vec<String>,

    /// Model's self-reported confidence (0.0-1.0)
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl VisionAnalysis {
    /// Issue descriptors of all conditions, skipping blanks.
    pub fn issues(&self) -> Vec<String> {
        self.conditions
            .iter()
            .map(|c| c.issue.trim())
            .filter(|i| !i.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One detected condition on a building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// roof | exterior | interior | structural | mechanical | ...
    #[serde(default)]
    pub category: String,

    pub issue: String,

    #[serde(default)]
    pub severity: Option<Severity>,

    #[serde(default)]
    pub location: Option<String>,
}

/// Condition severity as reported by the vision model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Kind of uploaded project document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PriorSor,
    CostReview,
    Plan,
    ChangeOrder,
    Other(String),
}

impl DocumentType {
    /// Parse a stored document type tag. Unknown tags become `Other`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "prior_sor" => Self::PriorSor,
            "cost_review" => Self::CostReview,
            "plan" => Self::Plan,
            "change_order" => Self::ChangeOrder,
            other => Self::Other(other.to_string()),
        }
    }

    /// Stable tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PriorSor => "prior_sor",
            Self::CostReview => "cost_review",
            Self::Plan => "plan",
            Self::ChangeOrder => "change_order",
            Self::Other(tag) => tag,
        }
    }

    /// Human title used in citation labels.
    pub fn title(&self) -> String {
        match self {
            Self::PriorSor => "Prior SOR".to_string(),
            Self::CostReview => "Cost Review".to_string(),
            Self::Plan => "Plan".to_string(),
            Self::ChangeOrder => "Change Order".to_string(),
            Self::Other(tag) if tag.is_empty() => "Document".to_string(),
            Self::Other(tag) => tag.replace('_', " "),
        }
    }
}

/// Parsed document fields, keyed by the document type's schema.
pub type ParsedFields = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_analysis_deserializes_partial_json() {
        let json = r#"{
            "description": "North elevation facade",
            "conditions": [
                {"category": "exterior", "issue": "cracked sealant", "severity": "moderate"}
            ],
            "confidence": 0.85
        }"#;
        let analysis: VisionAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.conditions.len(), 1);
        assert_eq!(analysis.conditions[0].severity, Some(Severity::Moderate));
        assert!(analysis.materials.is_empty());
        assert_eq!(analysis.issues(), vec!["cracked sealant".to_string()]);
    }

    #[test]
    fn test_document_type_tags() {
        assert_eq!(DocumentType::from_tag("prior_sor"), DocumentType::PriorSor);
        assert_eq!(DocumentType::PriorSor.title(), "Prior SOR");
        let other = DocumentType::from_tag("submittal_log");
        assert_eq!(other.as_str(), "submittal_log");
        assert_eq!(other.title(), "submittal log");
    }
}
