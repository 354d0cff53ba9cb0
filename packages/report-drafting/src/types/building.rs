//! Building classification types.

use serde::{Deserialize, Serialize};

use super::analysis::VisionAnalysis;

/// Similarity of an image to one known building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingMatch {
    pub building_id: String,
    pub similarity: f32,

    /// `similarity >= threshold` (inclusive)
    pub is_confident: bool,
}

impl BuildingMatch {
    /// A match is confident when `similarity >= threshold` (inclusive).
    pub fn new(building_id: impl Into<String>, similarity: f32, threshold: f32) -> Self {
        Self {
            building_id: building_id.into(),
            similarity,
            is_confident: similarity >= threshold,
        }
    }
}

/// Result of classifying one image against a project's buildings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Candidates with a stored feature vector, highest similarity first
    pub matches: Vec<BuildingMatch>,

    /// Top match, present only when it clears the confidence threshold
    pub best: Option<BuildingMatch>,

    /// Short explanation for the UI
    pub message: String,
}

impl Classification {
    /// Whether the caller must ask a person to pick the building.
    pub fn needs_manual_assignment(&self) -> bool {
        self.best.is_none()
    }
}

/// What is known about a building, used to build its feature vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingProfile {
    pub building_id: String,
    pub name: String,
    pub building_type: Option<String>,
    pub description: Option<String>,

    #[serde(default)]
    pub learned: LearnedFeatures,
}

impl BuildingProfile {
    pub fn new(building_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            building_id: building_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, building_type: impl Into<String>) -> Self {
        self.building_type = Some(building_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Text embedded to produce the building's stored feature vector.
    pub fn feature_text(&self) -> String {
        let mut parts = vec![format!("Building: {}", self.name)];
        if let Some(t) = self.building_type.as_deref().filter(|t| !t.is_empty()) {
            parts.push(format!("Type: {t}"));
        }
        if let Some(d) = self.description.as_deref().filter(|d| !d.is_empty()) {
            parts.push(d.to_string());
        }
        if !self.learned.materials.is_empty() {
            parts.push(format!("Materials: {}", self.learned.materials.join(", ")));
        }
        if !self.learned.characteristics.is_empty() {
            parts.push(format!(
                "Characteristics: {}",
                self.learned.characteristics.join(", ")
            ));
        }
        parts.join(" ")
    }
}

/// Features accumulated from images a person confirmed for a building.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedFeatures {
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub characteristics: Vec<String>,
    #[serde(default)]
    pub typical_areas: Vec<String>,
}

impl LearnedFeatures {
    /// Merge a confirmed image's analysis without duplicating entries.
    ///
    /// Returns true when anything new was learned.
    pub fn absorb(&mut self, analysis: &VisionAnalysis, area: Option<&str>) -> bool {
        let before = self.len();
        push_unique(&mut self.materials, &analysis.materials);
        push_unique(&mut self.characteristics, &analysis.location_clues);
        if let Some(area) = area.filter(|a| !a.trim().is_empty()) {
            push_unique(&mut self.typical_areas, &[area.to_string()]);
        }
        self.len() > before
    }

    fn len(&self) -> usize {
        self.materials.len() + self.characteristics.len() + self.typical_areas.len()
    }
}

fn push_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// Text embedded for an image when classifying it against buildings.
///
/// Returns `None` when the analysis has nothing to classify on.
pub fn image_feature_text(analysis: &VisionAnalysis) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(t) = analysis.building_type.as_deref().filter(|t| !t.is_empty()) {
        parts.push(format!("Building type: {t}"));
    }
    if !analysis.materials.is_empty() {
        parts.push(format!("Materials: {}", analysis.materials.join(", ")));
    }
    if !analysis.location_clues.is_empty() {
        parts.push(format!("Location: {}", analysis.location_clues.join(", ")));
    }
    if !analysis.description.is_empty() {
        parts.push(analysis.description.chars().take(200).collect());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_feature_text_includes_learned() {
        let mut profile = BuildingProfile::new("b-1", "Building A").with_type("commercial");
        profile.learned.materials.push("brick".into());
        assert_eq!(
            profile.feature_text(),
            "Building: Building A Type: commercial Materials: brick"
        );
    }

    #[test]
    fn test_absorb_skips_duplicates() {
        let analysis = VisionAnalysis {
            materials: vec!["brick".into(), "steel".into()],
            location_clues: vec!["loading dock".into()],
            ..Default::default()
        };
        let mut learned = LearnedFeatures::default();
        assert!(learned.absorb(&analysis, Some("north wing")));
        assert!(!learned.absorb(&analysis, Some("north wing")));
        assert_eq!(learned.materials, vec!["brick", "steel"]);
        assert_eq!(learned.typical_areas, vec!["north wing"]);
    }

    #[test]
    fn test_match_threshold_is_inclusive() {
        assert!(BuildingMatch::new("b-1", 0.75, 0.75).is_confident);
        assert!(!BuildingMatch::new("b-1", 0.7499, 0.75).is_confident);
    }

    #[test]
    fn test_image_feature_text_empty_analysis() {
        assert!(image_feature_text(&VisionAnalysis::default()).is_none());
    }
}
