//! Draft synthesis: generation, citation checking, confidence scoring.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::citations::{resolve_citations, ResolvedCitations};
use super::with_deadline;
use crate::error::{DraftingError, Result};
use crate::traits::ai::Generator;
use crate::types::{
    config::{ConfidencePolicy, DraftingConfig, DraftingPolicy},
    draft::{DraftSection, DraftStatus, GenerationRequest},
};

/// Sends a request to the generation collaborator and post-processes the
/// raw text into a [`DraftSection`].
pub struct DraftSynthesizer {
    generator: Arc<dyn Generator>,
    policy: DraftingPolicy,
    confidence: ConfidencePolicy,
    timeout: Duration,
}

impl DraftSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, config: &DraftingConfig) -> Self {
        Self {
            generator,
            policy: config.policy.clone(),
            confidence: config.confidence.clone(),
            timeout: config.generation_timeout(),
        }
    }

    /// Override the generation deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One generation attempt.
    ///
    /// Fails with `DraftingError::Synthesis` (retryable) on timeout, a
    /// transient collaborator failure, or an empty response. A
    /// non-retryable collaborator rejection is passed through unchanged.
    pub async fn synthesize(&self, request: &GenerationRequest) -> Result<DraftSection> {
        let payload = request.render();
        debug!(
            section = %request.section_type,
            model = %self.generator.model_name(),
            evidence = request.evidence.len(),
            exemplars = request.exemplars.len(),
            "Generating section draft"
        );

        let raw = with_deadline(
            "generate",
            self.timeout,
            self.generator.generate(&payload, self.timeout),
        )
        .await
        .map_err(|e| match e {
            DraftingError::GenerationService {
                retryable: false, ..
            } => e,
            DraftingError::Cancelled => e,
            other => DraftingError::Synthesis {
                reason: other.to_string(),
            },
        })?;

        let text = strip_code_fence(raw.trim());
        if text.is_empty() {
            return Err(DraftingError::Synthesis {
                reason: "generator returned an empty response".into(),
            });
        }

        Ok(self.build_draft(request, text))
    }

    /// Synthesize, retrying once on a retryable failure.
    ///
    /// Never fails: a second failure (or a non-retryable first one) yields
    /// an empty [`DraftStatus::Failed`] section for human completion.
    pub async fn synthesize_with_retry(&self, request: &GenerationRequest) -> DraftSection {
        let first = match self.synthesize(request).await {
            Ok(draft) => return draft,
            Err(e) => e,
        };

        if !first.is_retryable() {
            warn!(section = %request.section_type, error = %first, "Synthesis failed, not retrying");
            return DraftSection::failed(request.section_type, first.to_string());
        }

        warn!(section = %request.section_type, error = %first, "Synthesis failed, retrying once");
        match self.synthesize(request).await {
            Ok(draft) => {
                info!(section = %request.section_type, "Synthesis succeeded on retry");
                draft
            }
            Err(second) => {
                warn!(
                    section = %request.section_type,
                    error = %second,
                    "Synthesis failed after retry, marking section failed"
                );
                DraftSection::failed(request.section_type, second.to_string())
            }
        }
    }

    fn build_draft(&self, request: &GenerationRequest, text: &str) -> DraftSection {
        let resolved = resolve_citations(text, request);

        for unmatched in &resolved.unmatched {
            warn!(
                section = %request.section_type,
                reference = %unmatched.reference,
                "Dropped citation matching no supplied evidence"
            );
        }
        if !resolved.unused.is_empty() {
            warn!(
                section = %request.section_type,
                unused = resolved.unused.len(),
                "Evidence provided but not cited"
            );
        }

        let unhedged = unhedged_inferences(&resolved.content, &self.policy);
        let confidence = score_confidence(&resolved, unhedged.is_empty(), &self.confidence);
        let status = if request.is_generic() {
            DraftStatus::Generic
        } else {
            DraftStatus::Drafted
        };

        DraftSection {
            section_type: request.section_type,
            content: resolved.content,
            evidence_references: resolved.references,
            unused_evidence: resolved.unused,
            unmatched_citations: resolved.unmatched,
            confidence,
            status,
        }
    }
}

/// Best-effort draft confidence in `[0.0, 1.0]`.
///
/// Weighted citation coverage plus a bonus when every inference is hedged,
/// minus a penalty per dropped citation.
pub fn score_confidence(
    resolved: &ResolvedCitations,
    hedging_ok: bool,
    policy: &ConfidencePolicy,
) -> f32 {
    let coverage = if resolved.provided_sources == 0 {
        policy.no_evidence_score
    } else {
        resolved.cited_sources as f32 / resolved.provided_sources as f32
    };
    let hedge = if hedging_ok { 1.0 } else { 0.0 };
    let penalty = policy.unmatched_marker_penalty * resolved.unmatched.len() as f32;

    (policy.coverage_weight * coverage + policy.hedge_weight * hedge - penalty).clamp(0.0, 1.0)
}

/// Sentences that use an inference marker without a hedge phrase.
pub fn unhedged_inferences(content: &str, policy: &DraftingPolicy) -> Vec<String> {
    content
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            let infers = policy
                .inference_markers
                .iter()
                .any(|m| contains_phrase(&lower, &m.to_lowercase()));
            let hedged = policy
                .hedge_phrases
                .iter()
                .any(|h| contains_phrase(&lower, &h.to_lowercase()));
            infers && !hedged
        })
        .map(str::to_string)
        .collect()
}

/// Whole-word phrase match on already-lowercased text.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Models sometimes wrap plain text in a Markdown fence.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ai::MockGenerator;
    use crate::types::{
        draft::Truncation,
        evidence::{EvidenceItem, EvidenceKind},
        retrieval::RetrievalResult,
        section::{ProjectContext, SectionType},
    };
    use mockall::Sequence;

    fn request() -> GenerationRequest {
        GenerationRequest {
            section_type: SectionType::SiteObservations,
            project_context: ProjectContext::new("Riverside Lofts"),
            evidence: vec![
                EvidenceItem {
                    source_id: "img-1".into(),
                    label: "IMG_045.jpg".into(),
                    confidence: Some(0.9),
                    kind: EvidenceKind::NarrativeText {
                        text: "Ponding water at roof drain".into(),
                    },
                },
                EvidenceItem {
                    source_id: "img-2".into(),
                    label: "IMG_046.jpg".into(),
                    confidence: Some(0.8),
                    kind: EvidenceKind::NarrativeText {
                        text: "Cracked sealant at window".into(),
                    },
                },
            ],
            exemplars: vec![RetrievalResult {
                record_id: "rec-1".into(),
                content: "It was observed that...".into(),
                similarity: 0.9,
                section_type: "site_observations".into(),
                source_label: "SOR #3".into(),
            }],
            instructions: "Be formal.".into(),
            policy_hash: String::new(),
            truncated: Truncation::default(),
        }
    }

    fn synthesizer(generator: MockGenerator) -> DraftSynthesizer {
        DraftSynthesizer::new(Arc::new(generator), &DraftingConfig::default())
    }

    fn generator() -> MockGenerator {
        let mut generator = MockGenerator::new();
        generator
            .expect_model_name()
            .returning(|| "mock-model".to_string());
        generator
    }

    #[tokio::test]
    async fn test_retry_after_timeout_is_transparent() {
        let mut generator = generator();
        let mut seq = Sequence::new();
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(DraftingError::Timeout {
                    operation: "generate".into(),
                    after_ms: 120_000,
                })
            });
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok("Ponding water was observed at the roof drain [Evidence: IMG_045.jpg].".into())
            });

        let draft = synthesizer(generator)
            .synthesize_with_retry(&request())
            .await;
        assert_eq!(draft.status, DraftStatus::Drafted);
        assert_eq!(draft.evidence_references.len(), 1);
        assert_eq!(draft.evidence_references[0].source_id, "img-1");
        assert_eq!(draft.unused_evidence.len(), 1);
    }

    #[tokio::test]
    async fn test_two_failures_yield_failed_section() {
        let mut generator = generator();
        generator.expect_generate().times(2).returning(|_, _| {
            Err(DraftingError::GenerationService {
                reason: "503 Service Unavailable".into(),
                retryable: true,
            })
        });

        let draft = synthesizer(generator)
            .synthesize_with_retry(&request())
            .await;
        assert!(draft.is_failed());
        assert!(draft.content.is_empty());
        assert_eq!(draft.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_not_retried() {
        let mut generator = generator();
        generator.expect_generate().times(1).returning(|_, _| {
            Err(DraftingError::GenerationService {
                reason: "400 Bad Request".into(),
                retryable: false,
            })
        });

        let draft = synthesizer(generator)
            .synthesize_with_retry(&request())
            .await;
        assert!(draft.is_failed());
    }

    #[tokio::test]
    async fn test_empty_response_is_synthesis_error() {
        let mut generator = generator();
        generator
            .expect_generate()
            .returning(|_, _| Ok("   \n".into()));

        let err = synthesizer(generator)
            .synthesize(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftingError::Synthesis { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_full_coverage_scores_high() {
        let mut generator = generator();
        generator.expect_generate().returning(|_, _| {
            Ok("Ponding water was observed [Evidence: E1]. Sealant appears to be cracked [Evidence: E2].".into())
        });

        let draft = synthesizer(generator).synthesize(&request()).await.unwrap();
        assert!((draft.confidence - 1.0).abs() < 1e-6);
        assert!(draft.unused_evidence.is_empty());
    }

    #[test]
    fn test_score_confidence_weights() {
        let policy = ConfidencePolicy::default();
        let half = ResolvedCitations {
            provided_sources: 2,
            cited_sources: 1,
            ..Default::default()
        };
        assert!((score_confidence(&half, true, &policy) - 0.65).abs() < 1e-6);
        assert!((score_confidence(&half, false, &policy) - 0.35).abs() < 1e-6);

        let nothing = ResolvedCitations::default();
        assert!((score_confidence(&nothing, true, &policy) - 0.51).abs() < 1e-6);
    }

    #[test]
    fn test_unhedged_inferences() {
        let policy = DraftingPolicy::default();
        let flagged = unhedged_inferences(
            "The leak likely originates at the parapet. Moisture appears to indicates prior leaks. Unlikely issues were noted.",
            &policy,
        );
        assert_eq!(flagged, vec!["The leak likely originates at the parapet"]);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```markdown\nBody text\n```"), "Body text");
        assert_eq!(strip_code_fence("Plain"), "Plain");
    }
}
