//! Building classification for uploaded photos.
//!
//! Each known building has one feature vector in the embedding index under
//! the [`BUILDING_NAMESPACE`] tag, stored as record
//! `building:<building id>` (see [`building_record_id`]). Confirming or
//! correcting an assignment re-embeds the building's profile and replaces
//! that vector.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use super::with_deadline;
use crate::error::{DraftingError, Result};
use crate::traits::{
    ai::Embedder,
    index::{cosine_similarity, EmbeddingIndex},
};
use crate::types::{
    analysis::VisionAnalysis,
    building::{image_feature_text, BuildingMatch, BuildingProfile, Classification},
    config::DraftingConfig,
    retrieval::{EmbeddingRecord, RecordId},
};

/// Index tag of building feature vectors.
pub const BUILDING_NAMESPACE: &str = "building";

/// Index record id of a building's feature vector.
///
/// Prefixed so building ids never collide with exemplar record ids.
pub fn building_record_id(building_id: &str) -> RecordId {
    format!("{BUILDING_NAMESPACE}:{building_id}")
}

/// Suggests which building a photo shows.
pub struct BuildingClassifier {
    index: Arc<dyn EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
    config: DraftingConfig,
}

impl BuildingClassifier {
    pub fn new(
        index: Arc<dyn EmbeddingIndex>,
        embedder: Arc<dyn Embedder>,
        config: DraftingConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Compare an image feature vector with each candidate's stored vector.
    ///
    /// Candidates without a stored vector are skipped. `best` is set only
    /// when the top similarity is at least the confidence threshold.
    pub async fn classify(
        &self,
        image_vector: &[f32],
        candidate_ids: &[String],
    ) -> Result<Classification> {
        if image_vector.len() != self.index.dimension() {
            return Err(DraftingError::validation(format!(
                "image vector has {} dimensions, index expects {}",
                image_vector.len(),
                self.index.dimension()
            )));
        }

        let threshold = self.config.confidence_threshold;
        let mut matches = Vec::new();
        for id in candidate_ids {
            let record = with_deadline(
                "index get",
                self.config.embedding_timeout(),
                self.index.get(&building_record_id(id)),
            )
            .await?;
            let Some(record) = record.filter(|r| r.section_type == BUILDING_NAMESPACE) else {
                debug!(building_id = %id, "No feature vector for candidate building");
                continue;
            };

            let similarity = cosine_similarity(image_vector, &record.vector).clamp(0.0, 1.0);
            matches.push(BuildingMatch::new(id.clone(), similarity, threshold));
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        matches.truncate(self.config.max_building_matches);

        let best = matches.first().filter(|m| m.is_confident).cloned();
        let message = match (&best, matches.first()) {
            (Some(best), _) => format!(
                "Matched building {} with {:.0}% similarity",
                best.building_id,
                best.similarity * 100.0
            ),
            (None, Some(top)) => format!(
                "Best match {:.0}% is below the {:.0}% threshold; assign the building manually",
                top.similarity * 100.0,
                threshold * 100.0
            ),
            (None, None) => "No buildings with learned features to compare".to_string(),
        };

        Ok(Classification {
            matches,
            best,
            message,
        })
    }

    /// Embed an image's analysis and classify it.
    pub async fn classify_analysis(
        &self,
        analysis: &VisionAnalysis,
        candidate_ids: &[String],
    ) -> Result<Classification> {
        let Some(text) = image_feature_text(analysis) else {
            return Ok(Classification {
                matches: Vec::new(),
                best: None,
                message: "Image analysis has no features to classify".to_string(),
            });
        };
        let vector = self.embed(&text).await?;
        self.classify(&vector, candidate_ids).await
    }

    /// Store (or replace) a building's feature vector from its profile.
    pub async fn index_building(&self, profile: &BuildingProfile) -> Result<RecordId> {
        let text = profile.feature_text();
        let vector = self.embed(&text).await?;
        let record = EmbeddingRecord::new(BUILDING_NAMESPACE, &profile.name, text, vector)
            .with_id(building_record_id(&profile.building_id));
        with_deadline(
            "index upsert",
            self.config.embedding_timeout(),
            self.index.upsert(record),
        )
        .await
    }

    /// Learn from a confirmed or corrected assignment.
    ///
    /// Merges the image's features into the profile and replaces the
    /// building's stored vector.
    pub async fn record_assignment(
        &self,
        profile: &mut BuildingProfile,
        analysis: &VisionAnalysis,
        area: Option<&str>,
    ) -> Result<RecordId> {
        let learned = profile.learned.absorb(analysis, area);
        let id = self.index_building(profile).await?;
        info!(building_id = %profile.building_id, record_id = %id, learned, "Recorded building assignment");
        Ok(id)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_deadline(
            "embed",
            self.config.embedding_timeout(),
            self.embedder.embed(text),
        )
        .await
    }
}
