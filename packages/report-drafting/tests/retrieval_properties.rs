//! Property-based tests for retrieval ordering, query building and
//! citation validation.

use proptest::prelude::*;
use std::sync::Arc;

use report_drafting::pipeline::citations::{find_markers, resolve_citations, resolve_marker};
use report_drafting::{
    build_query, DraftingConfig, EmbeddingIndex, EmbeddingRecord, EvidenceItem, EvidenceKind,
    GenerationRequest, MemoryIndex, MockEmbedder, ProjectContext, QueryContext, RetrievalEngine,
    RetrievalResult, SectionType, Truncation,
};

const DIMENSION: usize = 4;

fn non_zero_vector() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, DIMENSION)
        .prop_filter("vector must have a direction", |v| {
            v.iter().map(|x| x * x).sum::<f32>() > 1e-3
        })
}

fn section_type() -> impl Strategy<Value = SectionType> {
    prop::sample::select(SectionType::ALL.to_vec())
}

fn request(evidence_labels: &[String], exemplar_labels: &[String]) -> GenerationRequest {
    GenerationRequest {
        section_type: SectionType::SiteObservations,
        project_context: ProjectContext::new("P"),
        evidence: evidence_labels
            .iter()
            .enumerate()
            .map(|(i, label)| EvidenceItem {
                source_id: format!("src-{i}"),
                label: label.clone(),
                confidence: None,
                kind: EvidenceKind::NarrativeText {
                    text: "text".into(),
                },
            })
            .collect(),
        exemplars: exemplar_labels
            .iter()
            .enumerate()
            .map(|(i, label)| RetrievalResult {
                record_id: format!("rec-{i}"),
                content: "exemplar".into(),
                similarity: 0.5,
                section_type: "site_observations".into(),
                source_label: label.clone(),
            })
            .collect(),
        instructions: String::new(),
        policy_hash: String::new(),
        truncated: Truncation::default(),
    }
}

proptest! {
    /// Property: results are non-increasing in similarity, bounded to [0, 1]
    /// and never more than top_k
    #[test]
    fn retrieval_is_sorted_and_bounded(
        vectors in prop::collection::vec(non_zero_vector(), 1..12),
        query in non_zero_vector(),
        top_k in 1usize..8,
    ) {
        let results = tokio_test::block_on(async {
            let index = Arc::new(MemoryIndex::new(DIMENSION));
            for (i, vector) in vectors.iter().enumerate() {
                index
                    .upsert(EmbeddingRecord::new(
                        SectionType::SiteObservations.as_str(),
                        format!("SOR #{i}"),
                        format!("content {i}"),
                        vector.clone(),
                    ))
                    .await
                    .unwrap();
            }
            let engine = RetrievalEngine::new(
                index,
                Arc::new(MockEmbedder::new(DIMENSION)),
                DraftingConfig::default(),
            );
            engine
                .retrieve(&query, SectionType::SiteObservations, top_k, 0.0)
                .await
                .unwrap()
        });

        prop_assert_eq!(results.len(), top_k.min(vectors.len()));
        for pair in results.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
        }
        for result in &results {
            prop_assert!((0.0..=1.0).contains(&result.similarity));
        }
    }

    /// Property: the same inputs always build the same query text
    #[test]
    fn build_query_is_deterministic(
        section in section_type(),
        building_type in prop::option::of("[a-z_]{0,12}"),
        issues in prop::collection::vec("[a-z ]{0,16}", 0..5),
    ) {
        let mut context = QueryContext::new().with_issues(issues);
        if let Some(building_type) = building_type {
            context = context.with_building_type(building_type);
        }

        let first = build_query(section, &context);
        let second = build_query(section, &context.clone());

        prop_assert_eq!(&first, &second);
        let prefix = format!("Section type: {}", section.as_str());
        prop_assert!(first.starts_with(&prefix));
    }

    /// Property: every marker left after resolution points at supplied
    /// evidence or an exemplar
    #[test]
    fn resolved_markers_are_always_backed(
        evidence_count in 0usize..6,
        exemplar_count in 0usize..3,
        refs in prop::collection::vec(
            prop_oneof![
                (1usize..9).prop_map(|n| format!("E{n}")),
                (1usize..5).prop_map(|n| format!("X{n}")),
                (0usize..9).prop_map(|n| format!("IMG_{n:03}.jpg")),
                "[A-Za-z_]{1,10}",
            ],
            0..10,
        ),
    ) {
        let evidence_labels: Vec<String> =
            (0..evidence_count).map(|n| format!("IMG_{n:03}.jpg")).collect();
        let exemplar_labels: Vec<String> =
            (0..exemplar_count).map(|n| format!("SOR #{n}")).collect();
        let request = request(&evidence_labels, &exemplar_labels);

        let raw: String = refs
            .iter()
            .map(|r| format!("Observation noted [Evidence: {r}]."))
            .collect::<Vec<_>>()
            .join(" ");
        let resolved = resolve_citations(&raw, &request);

        for marker in find_markers(&resolved.content) {
            prop_assert!(!marker.refs.is_empty());
            for (_, target) in resolve_marker(&marker.refs, &request) {
                prop_assert!(target.is_some());
            }
        }
        for reference in &resolved.references {
            let supplied = request.evidence.iter().any(|e| e.source_id == reference.source_id)
                || request.exemplars.iter().any(|x| x.record_id == reference.source_id);
            prop_assert!(supplied);
        }
        prop_assert!(resolved.cited_sources <= resolved.provided_sources);
    }
}
