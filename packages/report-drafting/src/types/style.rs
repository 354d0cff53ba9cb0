//! Sample report ingestion and style rewriting types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::retrieval::RecordId;
use super::section::SectionType;
use crate::error::DraftingError;

/// What the generator extracted from a sample report.
///
/// Accepts both the short keys the extraction prompt asks for and the
/// long-form keys older replies used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleAnalysis {
    #[serde(default)]
    pub sections: Vec<SampleSection>,

    #[serde(default, alias = "style_characteristics")]
    pub style: serde_json::Map<String, serde_json::Value>,

    #[serde(default, alias = "common_phrases")]
    pub phrases: Vec<String>,

    #[serde(default, alias = "terminology")]
    pub terms: Vec<String>,
}

/// One section as labelled by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSection {
    #[serde(rename = "type")]
    pub section_type: String,

    #[serde(default)]
    pub content: String,
}

impl SampleSection {
    /// Map the generator's label onto a known section.
    ///
    /// Accepts canonical identifiers plus the short headings reports use
    /// ("summary", "observations", "safety").
    pub fn known_type(&self) -> Option<SectionType> {
        if let Ok(section) = self.section_type.parse::<SectionType>() {
            return Some(section);
        }
        let normalized = self
            .section_type
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "summary" | "executive" | "overview" => Some(SectionType::ExecutiveSummary),
            "status" => Some(SectionType::BuildingStatus),
            "observations" | "site_observation" | "building_observations" => {
                Some(SectionType::SiteObservations)
            }
            "budget" | "cost" | "costs" => Some(SectionType::BudgetSummary),
            "schedule" => Some(SectionType::ScheduleSummary),
            "safety" => Some(SectionType::SafetyObservations),
            "change_order" => Some(SectionType::ChangeOrders),
            "recommendation" | "next_steps" => Some(SectionType::Recommendations),
            _ => None,
        }
    }
}

/// Writing style learned from a sample report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    #[serde(default)]
    pub characteristics: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub common_phrases: Vec<String>,

    #[serde(default)]
    pub terminology: Vec<String>,
}

/// A section stored as an exemplar during sample ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedSection {
    pub section_type: SectionType,
    pub record_id: RecordId,
    pub preview: String,
}

/// Result of ingesting one sample report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    /// Shared by every record stored from this report, as the tag
    /// `sample:<id>`
    pub sample_id: Uuid,

    pub source_name: String,

    pub sections: Vec<IngestedSection>,

    /// Section labels that matched no known section
    #[serde(default)]
    pub skipped: Vec<String>,

    pub style: StyleProfile,
}

impl SampleReport {
    /// Tag carried by every record of this sample.
    pub fn tag(&self) -> String {
        sample_tag(self.sample_id)
    }
}

pub(crate) fn sample_tag(sample_id: Uuid) -> String {
    format!("sample:{sample_id}")
}

/// Target style for [`StyleRewriter`](crate::pipeline::rewrite::StyleRewriter).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStyle {
    /// Formal third-person register of a Site Observation Report
    #[default]
    FormalSor,
    Concise,
    Detailed,
}

impl RewriteStyle {
    pub const ALL: [RewriteStyle; 3] = [Self::FormalSor, Self::Concise, Self::Detailed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormalSor => "formal_sor",
            Self::Concise => "concise",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for RewriteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewriteStyle {
    type Err = DraftingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == normalized)
            .ok_or_else(|| DraftingError::validation(format!("unknown rewrite style: {s}")))
    }
}

/// Optional context appended to the rewrite instructions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteContext {
    pub section_type: Option<SectionType>,
    pub building_name: Option<String>,
}

impl RewriteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section(mut self, section_type: SectionType) -> Self {
        self.section_type = Some(section_type);
        self
    }

    pub fn with_building(mut self, name: impl Into<String>) -> Self {
        self.building_name = Some(name.into());
        self
    }
}
