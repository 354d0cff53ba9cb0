//! Evidence collection.
//!
//! Wraps vision and parser output into citable [`EvidenceItem`]s. Output
//! order is a contract: images (input order), then documents (input
//! order), then narrative. Citation numbering `E1..En` follows it.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::with_deadline;
use crate::error::{DraftingError, Result};
use crate::traits::{
    ai::{DocumentParser, VisionAnalyzer},
    assets::AssetSource,
};
use crate::types::{
    analysis::{DocumentType, ParsedFields, Severity, VisionAnalysis},
    config::DraftingConfig,
    evidence::{CollectedEvidence, CollectionWarning, EvidenceItem, EvidenceKind, SourceType},
    section::SectionType,
};

/// Default source id of the inspector narrative.
pub const NARRATIVE_SOURCE_ID: &str = "narrative";

/// Inputs for one section's evidence collection.
#[derive(Debug, Clone)]
pub struct EvidenceRequest {
    pub section_type: SectionType,
    pub image_ids: Vec<String>,
    pub document_ids: Vec<String>,
    pub narrative: Option<String>,

    /// Source id and label of the narrative item
    pub narrative_source: (String, String),

    /// Ids whose failure aborts collection instead of being skipped
    pub required_ids: HashSet<String>,
}

impl EvidenceRequest {
    pub fn new(section_type: SectionType) -> Self {
        Self {
            section_type,
            image_ids: Vec::new(),
            document_ids: Vec::new(),
            narrative: None,
            narrative_source: (NARRATIVE_SOURCE_ID.to_string(), "Site visit narrative".to_string()),
            required_ids: HashSet::new(),
        }
    }

    pub fn with_images(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.image_ids = ids.into_iter().map(|id| id.into()).collect();
        self
    }

    pub fn with_documents(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.document_ids = ids.into_iter().map(|id| id.into()).collect();
        self
    }

    pub fn with_narrative(mut self, text: impl Into<String>) -> Self {
        self.narrative = Some(text.into());
        self
    }

    /// Attribute the narrative to a specific upstream record.
    pub fn with_narrative_source(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.narrative_source = (id.into(), label.into());
        self
    }

    /// Mark an image or document id as mandatory.
    pub fn require(mut self, id: impl Into<String>) -> Self {
        self.required_ids.insert(id.into());
        self
    }

    fn is_required(&self, id: &str) -> bool {
        self.required_ids.contains(id)
    }
}

/// Gathers image observations, document fields and narrative for a section.
pub struct EvidenceCollector {
    vision: Arc<dyn VisionAnalyzer>,
    parser: Arc<dyn DocumentParser>,
    assets: Arc<dyn AssetSource>,
    config: DraftingConfig,
}

impl EvidenceCollector {
    pub fn new(
        vision: Arc<dyn VisionAnalyzer>,
        parser: Arc<dyn DocumentParser>,
        assets: Arc<dyn AssetSource>,
        config: DraftingConfig,
    ) -> Self {
        Self {
            vision,
            parser,
            assets,
            config,
        }
    }

    /// Collect evidence for a section.
    ///
    /// Shorthand for [`collect_request`](Self::collect_request) with no
    /// mandatory items.
    pub async fn collect(
        &self,
        section_type: SectionType,
        image_ids: &[String],
        document_ids: &[String],
        narrative: Option<&str>,
    ) -> Result<CollectedEvidence> {
        let mut request = EvidenceRequest::new(section_type)
            .with_images(image_ids.iter().cloned())
            .with_documents(document_ids.iter().cloned());
        if let Some(text) = narrative {
            request = request.with_narrative(text);
        }
        self.collect_request(&request).await
    }

    /// Collect evidence for a section.
    ///
    /// A failing optional item is skipped with a warning. A failing
    /// required item fails the whole call with `DraftingError::Collection`.
    pub async fn collect_request(&self, request: &EvidenceRequest) -> Result<CollectedEvidence> {
        let mut collected = CollectedEvidence::default();

        // join_all keeps input order while the calls run concurrently
        let images = join_all(request.image_ids.iter().map(|id| self.image_items(id))).await;
        for (id, outcome) in request.image_ids.iter().zip(images) {
            absorb(request, id, SourceType::Image, outcome, &mut collected)?;
        }

        let documents = join_all(
            request
                .document_ids
                .iter()
                .map(|id| self.document_items(id, request.section_type)),
        )
        .await;
        for (id, outcome) in request.document_ids.iter().zip(documents) {
            absorb(request, id, SourceType::Document, outcome, &mut collected)?;
        }

        if let Some(text) = request.narrative.as_deref().map(str::trim) {
            if !text.is_empty() {
                let (source_id, label) = &request.narrative_source;
                collected.items.push(EvidenceItem {
                    source_id: source_id.clone(),
                    label: label.clone(),
                    confidence: None,
                    kind: EvidenceKind::NarrativeText {
                        text: text.to_string(),
                    },
                });
            }
        }

        debug!(
            section = %request.section_type,
            items = collected.items.len(),
            warnings = collected.warnings.len(),
            "Collected evidence"
        );
        Ok(collected)
    }

    async fn image_items(&self, id: &str) -> Result<Vec<EvidenceItem>> {
        let asset = with_deadline(
            "asset image",
            self.config.asset_timeout(),
            self.assets.image(id),
        )
        .await?;
        let analysis = with_deadline(
            "vision analyze",
            self.config.vision_timeout(),
            self.vision.analyze(&asset.bytes, &asset.mime_type),
        )
        .await?;
        let items = observations(id, &asset.filename, &analysis);
        if items.is_empty() {
            return Err(DraftingError::VisionService(format!(
                "no observations returned for {}",
                asset.filename
            )));
        }
        Ok(items)
    }

    async fn document_items(
        &self,
        id: &str,
        section_type: SectionType,
    ) -> Result<Vec<EvidenceItem>> {
        let asset = with_deadline(
            "asset document",
            self.config.asset_timeout(),
            self.assets.document(id),
        )
        .await?;
        let fields = with_deadline(
            "document parse",
            self.config.parser_timeout(),
            self.parser.parse(&asset.bytes, &asset.doc_type),
        )
        .await?;

        let label = asset.label();
        let items: Vec<EvidenceItem> = select_fields(section_type, &asset.doc_type, &fields)
            .into_iter()
            .map(|(field, value)| EvidenceItem {
                source_id: id.to_string(),
                label: label.clone(),
                confidence: None,
                kind: EvidenceKind::DocumentField {
                    document_type: asset.doc_type.clone(),
                    field,
                    value,
                },
            })
            .collect();

        if items.is_empty() {
            return Err(DraftingError::Parse(format!(
                "no fields extracted from {}",
                asset.filename
            )));
        }
        Ok(items)
    }
}

/// Keep an item's evidence, or record why it was skipped.
fn absorb(
    request: &EvidenceRequest,
    id: &str,
    source_type: SourceType,
    outcome: Result<Vec<EvidenceItem>>,
    collected: &mut CollectedEvidence,
) -> Result<()> {
    match outcome {
        Ok(items) => {
            collected.items.extend(items);
            Ok(())
        }
        Err(e) if request.is_required(id) => Err(DraftingError::Collection {
            source_id: id.to_string(),
            reason: e.to_string(),
        }),
        Err(e) => {
            warn!(
                section = %request.section_type,
                source_id = %id,
                source_type = %source_type,
                error = %e,
                "Skipping evidence item"
            );
            collected.warnings.push(CollectionWarning {
                source_id: id.to_string(),
                source_type,
                message: e.to_string(),
            });
            Ok(())
        }
    }
}

/// One evidence item per distinct condition, safety issue, or (when the
/// image shows neither) the general description.
pub fn observations(source_id: &str, filename: &str, analysis: &VisionAnalysis) -> Vec<EvidenceItem> {
    let mut builder = ObservationBuilder {
        source_id,
        filename,
        confidence: analysis.confidence,
        seen: HashSet::new(),
        items: Vec::new(),
    };

    for condition in &analysis.conditions {
        builder.push(
            &condition.category,
            &condition.issue,
            condition.severity,
            condition.location.as_deref(),
        );
    }
    for issue in &analysis.safety_issues {
        builder.push("safety", issue, None, None);
    }
    if builder.items.is_empty() {
        builder.push("general", &analysis.description, None, None);
    }
    builder.items
}

struct ObservationBuilder<'a> {
    source_id: &'a str,
    filename: &'a str,
    confidence: Option<f32>,
    seen: HashSet<(String, String, Option<String>)>,
    items: Vec<EvidenceItem>,
}

impl ObservationBuilder<'_> {
    fn push(
        &mut self,
        category: &str,
        observation: &str,
        severity: Option<Severity>,
        location: Option<&str>,
    ) {
        let observation = observation.trim();
        if observation.is_empty() {
            return;
        }
        let key = (
            category.to_lowercase(),
            observation.to_lowercase(),
            location.map(str::to_lowercase),
        );
        if !self.seen.insert(key) {
            return;
        }
        self.items.push(EvidenceItem {
            source_id: self.source_id.to_string(),
            label: self.filename.to_string(),
            confidence: self.confidence,
            kind: EvidenceKind::ImageObservation {
                category: category.to_string(),
                observation: observation.to_string(),
                severity,
                location: location.map(str::to_string),
            },
        });
    }
}

/// Parsed fields relevant to a section, as `(field path, value)` pairs.
///
/// Falls back to every non-empty top-level field when the section has no
/// mapping for the document type or none of the mapped fields are present.
pub fn select_fields(
    section_type: SectionType,
    doc_type: &DocumentType,
    fields: &ParsedFields,
) -> Vec<(String, serde_json::Value)> {
    if let Some(paths) = relevant_fields(section_type, doc_type) {
        let selected: Vec<_> = paths
            .iter()
            .filter_map(|path| {
                lookup(fields, path)
                    .filter(|v| !is_blank(v))
                    .map(|v| (path.to_string(), v.clone()))
            })
            .collect();
        if !selected.is_empty() {
            return selected;
        }
    }

    fields
        .iter()
        .filter(|(_, v)| !is_blank(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Which parsed fields feed which section. `None` means "all fields".
pub fn relevant_fields(
    section_type: SectionType,
    doc_type: &DocumentType,
) -> Option<&'static [&'static str]> {
    use SectionType::*;

    match (doc_type, section_type) {
        (DocumentType::PriorSor, ExecutiveSummary) => Some(&[
            "sections.executive_summary",
            "percent_complete",
            "report_date",
        ]),
        (DocumentType::PriorSor, SiteObservations | BuildingStatus) => {
            Some(&["sections.building_observations", "percent_complete"])
        }
        (DocumentType::PriorSor, BudgetSummary) => Some(&["sections.budget_summary"]),
        (DocumentType::PriorSor, ScheduleSummary) => {
            Some(&["sections.schedule_summary", "percent_complete"])
        }
        (DocumentType::PriorSor, Recommendations) => Some(&["recommendations"]),

        (DocumentType::CostReview, ExecutiveSummary) => {
            Some(&["current_budget", "total_costs_to_date", "percent_complete"])
        }
        (DocumentType::CostReview, BudgetSummary) => Some(&[
            "original_budget",
            "current_budget",
            "total_costs_to_date",
            "percent_complete",
            "line_items",
        ]),
        (DocumentType::CostReview, ScheduleSummary) => Some(&["percent_complete"]),
        (DocumentType::CostReview, ChangeOrders) => Some(&["change_orders"]),

        (DocumentType::Plan, SiteObservations | BuildingStatus) => {
            Some(&["buildings", "phases", "specifications"])
        }
        (DocumentType::Plan, ScheduleSummary) => Some(&["phases"]),

        (DocumentType::ChangeOrder, ChangeOrders | BudgetSummary) => Some(&[
            "co_number",
            "date",
            "description",
            "amount",
            "status",
            "reason",
        ]),

        _ => None,
    }
}

fn lookup<'a>(fields: &'a ParsedFields, path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAssetSource, MockParser, MockVision};
    use crate::traits::assets::{DocumentAsset, ImageAsset};
    use crate::types::analysis::Condition;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Asset store whose lookups never complete.
    struct StalledAssets;

    #[async_trait]
    impl AssetSource for StalledAssets {
        async fn image(&self, _id: &str) -> Result<ImageAsset> {
            std::future::pending().await
        }

        async fn document(&self, _id: &str) -> Result<DocumentAsset> {
            std::future::pending().await
        }
    }

    fn collector_with(assets: Arc<dyn AssetSource>) -> EvidenceCollector {
        EvidenceCollector::new(
            Arc::new(MockVision::new()),
            Arc::new(MockParser::new()),
            assets,
            DraftingConfig::default().with_collaborator_timeout(Duration::from_millis(50)),
        )
    }

    #[tokio::test]
    async fn test_stalled_asset_lookup_times_out_as_warning() {
        let collector = collector_with(Arc::new(StalledAssets));
        let request = EvidenceRequest::new(SectionType::SiteObservations)
            .with_images(["img-1"])
            .with_documents(["doc-1"])
            .with_narrative("Crew on site.");

        let collected = tokio::time::timeout(Duration::from_secs(2), collector.collect_request(&request))
            .await
            .expect("collection must honour the asset deadline")
            .unwrap();

        assert_eq!(collected.items.len(), 1);
        assert_eq!(collected.warnings.len(), 2);
        assert!(collected.warnings.iter().all(|w| w.message.contains("asset")));
    }

    #[tokio::test]
    async fn test_stalled_required_asset_fails_collection() {
        let collector = collector_with(Arc::new(StalledAssets));
        let request = EvidenceRequest::new(SectionType::SiteObservations)
            .with_images(["img-1"])
            .require("img-1");

        let err = tokio::time::timeout(Duration::from_secs(2), collector.collect_request(&request))
            .await
            .expect("collection must honour the asset deadline")
            .unwrap_err();
        assert!(matches!(err, DraftingError::Collection { .. }));
    }

    #[tokio::test]
    async fn test_unknown_asset_is_skipped() {
        let collector = collector_with(Arc::new(MemoryAssetSource::new()));
        let collected = collector
            .collect(SectionType::SiteObservations, &["img-404".to_string()], &[], None)
            .await
            .unwrap();
        assert!(collected.items.is_empty());
        assert_eq!(collected.warnings[0].source_id, "img-404");
    }

    fn fields(value: serde_json::Value) -> ParsedFields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_observations_one_per_distinct_condition() {
        let analysis = VisionAnalysis {
            description: "Roof view".into(),
            conditions: vec![
                Condition {
                    category: "roof".into(),
                    issue: "Ponding water".into(),
                    severity: Some(Severity::Moderate),
                    location: Some("NE corner".into()),
                },
                Condition {
                    category: "roof".into(),
                    issue: "ponding water".into(),
                    severity: Some(Severity::Moderate),
                    location: Some("NE corner".into()),
                },
            ],
            safety_issues: vec!["Missing guardrail".into()],
            confidence: Some(0.8),
            ..Default::default()
        };
        let items = observations("img-1", "IMG_001.jpg", &analysis);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.label == "IMG_001.jpg"));
        assert_eq!(items[0].confidence, Some(0.8));
        assert_eq!(items[1].content(), "safety: Missing guardrail");
    }

    #[test]
    fn test_observations_fall_back_to_description() {
        let analysis = VisionAnalysis {
            description: "Framing complete on level 2".into(),
            ..Default::default()
        };
        let items = observations("img-2", "IMG_002.jpg", &analysis);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content(), "general: Framing complete on level 2");

        assert!(observations("img-3", "IMG_003.jpg", &VisionAnalysis::default()).is_empty());
    }

    #[test]
    fn test_select_fields_follows_relevance_map() {
        let parsed = fields(json!({
            "original_budget": 1000000,
            "current_budget": 1150000,
            "total_costs_to_date": 400000,
            "percent_complete": 35,
            "change_orders": [{"number": "CO-001", "amount": 150000}],
            "line_items": []
        }));

        let budget = select_fields(SectionType::BudgetSummary, &DocumentType::CostReview, &parsed);
        let names: Vec<_> = budget.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["original_budget", "current_budget", "total_costs_to_date", "percent_complete"]
        );

        let cos = select_fields(SectionType::ChangeOrders, &DocumentType::CostReview, &parsed);
        assert_eq!(cos.len(), 1);
        assert_eq!(cos[0].0, "change_orders");
    }

    #[test]
    fn test_select_fields_nested_path() {
        let parsed = fields(json!({
            "report_date": "2026-01-12",
            "sections": {"budget_summary": "Project remains within budget."}
        }));
        let selected = select_fields(SectionType::BudgetSummary, &DocumentType::PriorSor, &parsed);
        assert_eq!(
            selected,
            vec![(
                "sections.budget_summary".to_string(),
                json!("Project remains within budget.")
            )]
        );
    }

    #[test]
    fn test_select_fields_falls_back_to_all() {
        let parsed = fields(json!({"key_points": ["Access road closed"], "names": []}));
        let selected = select_fields(
            SectionType::SafetyObservations,
            &DocumentType::Other("memo".into()),
            &parsed,
        );
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "key_points");
    }
}
