//! Exemplar retrieval (RAG) and style learning from sample reports.
//!
//! The query text built here is what gets embedded, so its field order and
//! separators are part of the retrieval behavior:
//!
//! ```text
//! Section type: site_observations Building type: commercial Conditions: cracked sealant, ponding water
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::prompts::{format_sample_prompt, json_object_slice, SAMPLE_REPORT_SYSTEM};
use super::with_deadline;
use crate::error::{DraftingError, Result};
use crate::traits::{
    ai::{Embedder, Generator},
    index::EmbeddingIndex,
};
use crate::types::{
    config::DraftingConfig,
    draft::PromptPayload,
    evidence::{EvidenceItem, EvidenceKind},
    retrieval::{
        preview_text, EmbeddingRecord, QueryContext, RecordId, RecordMetadata, RetrievalResult,
    },
    section::SectionType,
    style::{sample_tag, IngestedSection, SampleAnalysis, SampleReport, StyleProfile},
};

/// Build the retrieval query for a section.
///
/// Pure and deterministic: section type, then building type if known,
/// then the comma-joined issues if any, space separated.
pub fn build_query(section_type: SectionType, context: &QueryContext) -> String {
    let mut parts = vec![format!("Section type: {}", section_type.as_str())];

    if let Some(building_type) = context
        .building_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        parts.push(format!("Building type: {building_type}"));
    }

    let issues: Vec<&str> = context
        .issues
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .collect();
    if !issues.is_empty() {
        parts.push(format!("Conditions: {}", issues.join(", ")));
    }

    parts.join(" ")
}

impl QueryContext {
    /// Issues observed in image evidence, first occurrence order.
    ///
    /// Safety and general-description observations are not conditions and
    /// are left out.
    pub fn from_evidence(items: &[EvidenceItem]) -> Self {
        let mut issues: Vec<String> = Vec::new();
        for item in items {
            if let EvidenceKind::ImageObservation {
                category,
                observation,
                ..
            } = &item.kind
            {
                if category == "safety" || category == "general" {
                    continue;
                }
                if !issues.iter().any(|i| i.eq_ignore_ascii_case(observation)) {
                    issues.push(observation.clone());
                }
            }
        }
        Self {
            building_type: None,
            issues,
        }
    }
}

/// Finds historical sections to use as style exemplars.
pub struct RetrievalEngine {
    index: Arc<dyn EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
    config: DraftingConfig,
}

impl RetrievalEngine {
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

    /// The index this engine reads and writes.
    pub fn index(&self) -> &Arc<dyn EmbeddingIndex> {
        &self.index
    }

    /// Nearest exemplars for an already-embedded query.
    ///
    /// Results below `min_similarity` are dropped. An index with no
    /// records for the section yields an empty result, not an error.
    pub async fn retrieve(
        &self,
        query_vector: &[f32],
        section_type: SectionType,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<RetrievalResult>> {
        let outcome = with_deadline(
            "index query",
            self.config.embedding_timeout(),
            self.index
                .query(query_vector, Some(section_type.as_str()), top_k),
        )
        .await;

        let results = match outcome {
            Ok(results) => results,
            Err(DraftingError::EmptyIndex { .. }) => {
                debug!(section = %section_type, "No indexed exemplars for section");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(results
            .into_iter()
            .filter(|r| r.similarity >= min_similarity)
            .collect())
    }

    /// Embed the section's query and retrieve with the configured
    /// `retrieval_top_k` and `min_similarity`.
    pub async fn retrieve_for(
        &self,
        section_type: SectionType,
        context: &QueryContext,
    ) -> Result<Vec<RetrievalResult>> {
        let query = build_query(section_type, context);
        let vector = self.embed(&query).await?;
        let results = self
            .retrieve(
                &vector,
                section_type,
                self.config.retrieval_top_k,
                self.config.min_similarity,
            )
            .await?;

        debug!(
            section = %section_type,
            query = %query,
            results = results.len(),
            "Retrieved exemplars"
        );
        Ok(results)
    }

    /// Embed a historical section and store it for future retrieval.
    pub async fn ingest_exemplar(
        &self,
        section_type: SectionType,
        source_label: &str,
        content: &str,
        metadata: RecordMetadata,
    ) -> Result<RecordId> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DraftingError::validation("exemplar content is empty"));
        }

        let vector = self.embed(content).await?;
        let record = EmbeddingRecord::new(section_type.as_str(), source_label, content, vector)
            .with_metadata(metadata);
        let id = with_deadline(
            "index upsert",
            self.config.embedding_timeout(),
            self.index.upsert(record),
        )
        .await?;

        info!(section = %section_type, record_id = %id, source = %source_label, "Ingested exemplar");
        Ok(id)
    }

    /// Flag a stored record as a reference-quality exemplar.
    ///
    /// Returns false when the record does not exist.
    pub async fn promote_exemplar(&self, id: &str, quality_score: Option<f32>) -> Result<bool> {
        let record = with_deadline(
            "index get",
            self.config.embedding_timeout(),
            self.index.get(id),
        )
        .await?;
        let Some(record) = record else {
            return Ok(false);
        };

        let mut metadata = record.metadata;
        metadata.is_exemplar = true;
        if quality_score.is_some() {
            metadata.quality_score = quality_score;
        }
        with_deadline(
            "index update_metadata",
            self.config.embedding_timeout(),
            self.index.update_metadata(id, metadata),
        )
        .await
    }

    /// Learn from a complete sample report.
    ///
    /// The generator splits the report into labelled sections and
    /// describes its style. Every recognized section is stored as an
    /// exemplar tagged `sample:<id>` plus the extracted terminology.
    /// Labels matching no known section are reported in `skipped`.
    pub async fn ingest_sample_report(
        &self,
        generator: &dyn Generator,
        content: &str,
        source_name: &str,
    ) -> Result<SampleReport> {
        if content.trim().is_empty() {
            return Err(DraftingError::validation("sample report is empty"));
        }

        let payload = PromptPayload {
            system: SAMPLE_REPORT_SYSTEM.to_string(),
            user: format_sample_prompt(content),
        };
        let timeout = self.config.generation_timeout();
        let reply = with_deadline(
            "sample analysis",
            timeout,
            generator.generate(&payload, timeout),
        )
        .await?;

        let json = json_object_slice(&reply)
            .ok_or_else(|| DraftingError::Parse("sample analysis reply has no JSON object".into()))?;
        let analysis: SampleAnalysis = serde_json::from_str(json)
            .map_err(|e| DraftingError::Parse(format!("sample analysis reply: {e}")))?;

        let sample_id = Uuid::new_v4();
        let metadata = RecordMetadata::exemplar()
            .with_tags(std::iter::once(sample_tag(sample_id)).chain(analysis.terms.iter().cloned()));

        let mut sections = Vec::new();
        let mut skipped = Vec::new();
        for section in &analysis.sections {
            if section.content.trim().is_empty() {
                continue;
            }
            let Some(section_type) = section.known_type() else {
                warn!(label = %section.section_type, source = %source_name, "Skipping unrecognized sample section");
                skipped.push(section.section_type.clone());
                continue;
            };

            let record_id = self
                .ingest_exemplar(section_type, source_name, &section.content, metadata.clone())
                .await?;
            sections.push(IngestedSection {
                section_type,
                record_id,
                preview: preview_text(section.content.trim()),
            });
        }

        info!(
            sample_id = %sample_id,
            source = %source_name,
            sections = sections.len(),
            skipped = skipped.len(),
            "Ingested sample report"
        );

        Ok(SampleReport {
            sample_id,
            source_name: source_name.to_string(),
            sections,
            skipped,
            style: StyleProfile {
                characteristics: analysis.style,
                common_phrases: analysis.phrases,
                terminology: analysis.terms,
            },
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryIndex;
    use crate::testing::{MockEmbedder, MockGenerator, StalledIndex};
    use std::time::Duration;

    fn engine(embedder: MockEmbedder) -> RetrievalEngine {
        let dim = embedder.dimension();
        RetrievalEngine::new(
            Arc::new(MemoryIndex::new(dim)),
            Arc::new(embedder),
            DraftingConfig::default(),
        )
    }

    #[test]
    fn test_build_query_field_order() {
        let context = QueryContext::new()
            .with_building_type("commercial")
            .with_issues(["cracked sealant", "ponding water"]);
        assert_eq!(
            build_query(SectionType::SiteObservations, &context),
            "Section type: site_observations Building type: commercial Conditions: cracked sealant, ponding water"
        );
    }

    #[test]
    fn test_build_query_skips_missing_parts() {
        assert_eq!(
            build_query(SectionType::BudgetSummary, &QueryContext::new()),
            "Section type: budget_summary"
        );

        let issues_only = QueryContext::new().with_issues(["", "  efflorescence "]);
        assert_eq!(
            build_query(SectionType::BuildingStatus, &issues_only),
            "Section type: building_status Conditions: efflorescence"
        );
    }

    #[tokio::test]
    async fn test_retrieve_from_empty_index_is_empty() {
        let engine = engine(MockEmbedder::new(8));
        let results = engine
            .retrieve_for(SectionType::ExecutiveSummary, &QueryContext::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_applies_min_similarity() {
        let embedder = MockEmbedder::new(2)
            .with_vector("close", vec![1.0, 0.1])
            .with_vector("far", vec![0.1, 1.0]);
        let engine = engine(embedder);
        engine
            .ingest_exemplar(SectionType::ExecutiveSummary, "SOR #1", "close", RecordMetadata::default())
            .await
            .unwrap();
        engine
            .ingest_exemplar(SectionType::ExecutiveSummary, "SOR #2", "far", RecordMetadata::default())
            .await
            .unwrap();

        let results = engine
            .retrieve(&[1.0, 0.0], SectionType::ExecutiveSummary, 5, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_label, "SOR #1");
    }

    #[tokio::test]
    async fn test_ingest_rejects_blank_content() {
        let engine = engine(MockEmbedder::new(4));
        let err = engine
            .ingest_exemplar(SectionType::Recommendations, "SOR #1", "  ", RecordMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftingError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_promote_exemplar() {
        let engine = engine(MockEmbedder::new(4));
        let id = engine
            .ingest_exemplar(
                SectionType::Recommendations,
                "SOR #4",
                "It is recommended that the contractor reseal all joints.",
                RecordMetadata::default(),
            )
            .await
            .unwrap();

        assert!(engine.promote_exemplar(&id, Some(0.95)).await.unwrap());
        let stored = engine.index().get(&id).await.unwrap().unwrap();
        assert!(stored.metadata.is_exemplar);
        assert_eq!(stored.metadata.quality_score, Some(0.95));

        assert!(!engine.promote_exemplar("missing", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_index_writes_honour_deadline() {
        let engine = RetrievalEngine::new(
            Arc::new(StalledIndex::new(4)),
            Arc::new(MockEmbedder::new(4)),
            DraftingConfig::default().with_collaborator_timeout(Duration::from_millis(50)),
        );

        let ingest = tokio::time::timeout(
            Duration::from_secs(2),
            engine.ingest_exemplar(
                SectionType::ExecutiveSummary,
                "SOR #9",
                "The project is on schedule.",
                RecordMetadata::default(),
            ),
        )
        .await
        .expect("ingest must honour the index deadline");
        assert!(matches!(ingest, Err(DraftingError::Timeout { after_ms: 50, .. })));

        let promote = tokio::time::timeout(Duration::from_secs(2), engine.promote_exemplar("r1", None))
            .await
            .expect("promote must honour the index deadline");
        assert!(matches!(promote, Err(DraftingError::Timeout { .. })));
    }

    const SAMPLE_REPLY: &str = r#"```json
{"sections": [
  {"type": "summary", "content": "Construction continued on schedule during the reporting period."},
  {"type": "site_observations", "content": "It was observed that the sealant at the east parapet was cracked."},
  {"type": "appendix", "content": "Photo log attached."},
  {"type": "recommendations", "content": "  "}
 ],
 "style_characteristics": {"voice": "passive", "tone": "formal"},
 "common_phrases": ["It was observed that"],
 "terminology": ["parapet", "sealant"]}
```"#;

    #[tokio::test]
    async fn test_ingest_sample_report_stores_known_sections() {
        let engine = engine(MockEmbedder::new(8));
        let generator = MockGenerator::new().with_response(SAMPLE_REPLY);

        let report = engine
            .ingest_sample_report(&generator, "Full sample report text.", "SOR 2023-14")
            .await
            .unwrap();

        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].section_type, SectionType::ExecutiveSummary);
        assert_eq!(report.sections[1].section_type, SectionType::SiteObservations);
        assert_eq!(report.skipped, vec!["appendix"]);
        assert_eq!(report.style.characteristics["voice"], "passive");
        assert_eq!(report.style.terminology, vec!["parapet", "sealant"]);
        assert_eq!(engine.index().len().await.unwrap(), 2);

        let stored = engine
            .index()
            .get(&report.sections[1].record_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.metadata.is_exemplar);
        assert!(stored.metadata.tags.contains(&report.tag()));
        assert!(stored.metadata.tags.iter().any(|t| t == "parapet"));
        assert_eq!(stored.source_label, "SOR 2023-14");

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, SAMPLE_REPORT_SYSTEM);
        assert!(calls[0].user.contains("Full sample report text."));
    }

    #[tokio::test]
    async fn test_ingested_sample_sections_are_retrievable() {
        let engine = engine(MockEmbedder::new(8));
        let generator = MockGenerator::new().with_response(SAMPLE_REPLY);
        engine
            .ingest_sample_report(&generator, "Sample.", "SOR 2023-14")
            .await
            .unwrap();

        let results = engine
            .retrieve(&[1.0; 8], SectionType::ExecutiveSummary, 5, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.starts_with("Construction continued"));
    }

    #[tokio::test]
    async fn test_ingest_sample_report_rejects_bad_replies() {
        let engine = engine(MockEmbedder::new(8));

        let blank = engine
            .ingest_sample_report(&MockGenerator::new(), "   ", "SOR")
            .await
            .unwrap_err();
        assert!(matches!(blank, DraftingError::Validation { .. }));

        let prose = MockGenerator::new().with_response("I could not find any sections.");
        let err = engine
            .ingest_sample_report(&prose, "Sample.", "SOR")
            .await
            .unwrap_err();
        assert!(matches!(err, DraftingError::Parse(_)));
        assert_eq!(engine.index().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sample_analysis_honours_generation_deadline() {
        let config = DraftingConfig::default().with_generation_timeout(Duration::from_millis(50));
        let engine = RetrievalEngine::new(
            Arc::new(MemoryIndex::new(4)),
            Arc::new(MockEmbedder::new(4)),
            config,
        );
        let generator = MockGenerator::new().with_hang();

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            engine.ingest_sample_report(&generator, "Sample.", "SOR"),
        )
        .await
        .expect("sample analysis must honour the generation deadline");
        assert!(matches!(outcome, Err(DraftingError::Timeout { .. })));
    }
}
