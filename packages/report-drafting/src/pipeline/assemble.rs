//! Prompt assembly.
//!
//! Pure data transformation from collected evidence and retrieved
//! exemplars to a capped, ordered [`GenerationRequest`].
//!
//! Two caps apply: item counts, then a character budget for the rendered
//! prompt. The budget is spent on evidence first (highest confidence
//! first), then on exemplars (most similar first). Each entry is cut to
//! `max_entry_chars` and to what is left of the budget. An entry that no
//! longer fits at all is dropped.

use std::cmp::Ordering;
use tracing::debug;

use super::prompts::policy_hash;
use crate::error::{DraftingError, Result};
use crate::types::{
    config::{DraftingConfig, DraftingPolicy},
    draft::{GenerationRequest, Truncation},
    evidence::{truncate_chars, EvidenceItem},
    retrieval::RetrievalResult,
    section::{ProjectContext, SectionType},
};

/// Rendered prompt text outside the entries: headings, placeholders and
/// the closing directive.
const PROMPT_FRAME_CHARS: usize = 800;

/// Per-entry tag, source type, similarity and separators.
const ENTRY_FRAME_CHARS: usize = 48;

/// Combines evidence, exemplars and project context into a request.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    policy: DraftingPolicy,
    max_evidence_items: usize,
    max_exemplars: usize,
    max_prompt_chars: usize,
    max_entry_chars: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::from_config(&DraftingConfig::default())
    }
}

impl PromptAssembler {
    pub fn new(policy: DraftingPolicy, max_evidence_items: usize, max_exemplars: usize) -> Self {
        let defaults = DraftingConfig::default();
        Self {
            policy,
            max_evidence_items,
            max_exemplars,
            max_prompt_chars: defaults.max_prompt_chars,
            max_entry_chars: defaults.max_entry_chars,
        }
    }

    pub fn from_config(config: &DraftingConfig) -> Self {
        Self::new(
            config.policy.clone(),
            config.max_evidence_items,
            config.max_exemplars,
        )
        .with_prompt_budget(config.max_prompt_chars, config.max_entry_chars)
    }

    /// Set the rendered prompt budget and the per-entry limit, in characters.
    pub fn with_prompt_budget(mut self, max_prompt_chars: usize, max_entry_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self.max_entry_chars = max_entry_chars;
        self
    }

    pub fn policy(&self) -> &DraftingPolicy {
        &self.policy
    }

    /// Assemble a request for a section given by its identifier.
    ///
    /// Fails with `DraftingError::Validation` for an unknown section type.
    pub fn assemble(
        &self,
        section_type: &str,
        project_context: ProjectContext,
        evidence: Vec<EvidenceItem>,
        exemplars: Vec<RetrievalResult>,
    ) -> Result<GenerationRequest> {
        let section_type: SectionType = section_type.parse()?;
        self.assemble_section(section_type, project_context, evidence, exemplars)
    }

    /// Assemble a request for a known section type.
    ///
    /// Evidence keeps the highest-confidence items in their original order;
    /// exemplars keep the most similar, most similar first.
    pub fn assemble_section(
        &self,
        section_type: SectionType,
        project_context: ProjectContext,
        evidence: Vec<EvidenceItem>,
        exemplars: Vec<RetrievalResult>,
    ) -> Result<GenerationRequest> {
        if let Some(item) = evidence.iter().find(|i| i.source_id.trim().is_empty()) {
            return Err(DraftingError::validation(format!(
                "evidence item {:?} has no source id",
                item.label
            )));
        }
        if project_context.project_name.trim().is_empty() {
            return Err(DraftingError::validation("project name is empty"));
        }

        let evidence_count = evidence.len();
        let exemplar_count = exemplars.len();
        let evidence = cap_evidence(evidence, self.max_evidence_items);
        let exemplars = cap_exemplars(exemplars, self.max_exemplars);

        let fixed = self.policy.instructions.chars().count()
            + PROMPT_FRAME_CHARS
            + project_context
                .render_lines()
                .iter()
                .map(|line| line.chars().count() + 1)
                .sum::<usize>();
        let mut budget = PromptBudget {
            remaining: self.max_prompt_chars.saturating_sub(fixed),
            max_entry_chars: self.max_entry_chars,
        };
        let (evidence, evidence_shortened) = budget.fit_evidence(evidence);
        let (exemplars, exemplars_shortened) = budget.fit_exemplars(exemplars);

        let truncated = Truncation {
            evidence_dropped: evidence_count - evidence.len(),
            exemplars_dropped: exemplar_count - exemplars.len(),
            evidence_shortened,
            exemplars_shortened,
        };

        if !truncated.is_empty() {
            debug!(
                section = %section_type,
                evidence_dropped = truncated.evidence_dropped,
                exemplars_dropped = truncated.exemplars_dropped,
                evidence_shortened = truncated.evidence_shortened,
                exemplars_shortened = truncated.exemplars_shortened,
                "Capped generation request"
            );
        }

        Ok(GenerationRequest {
            section_type,
            project_context,
            evidence,
            exemplars,
            instructions: self.policy.instructions.clone(),
            policy_hash: policy_hash(&self.policy.instructions),
            truncated,
        })
    }
}

/// Characters left for evidence and exemplar entries.
struct PromptBudget {
    remaining: usize,
    max_entry_chars: usize,
}

impl PromptBudget {
    /// Room for an entry's text after its label and frame, if any.
    fn allowance(&self, label: &str) -> Option<usize> {
        let frame = ENTRY_FRAME_CHARS + label.chars().count();
        (self.remaining > frame).then(|| (self.remaining - frame).min(self.max_entry_chars))
    }

    fn spend(&mut self, label: &str, text_chars: usize) {
        let used = ENTRY_FRAME_CHARS + label.chars().count() + text_chars;
        self.remaining = self.remaining.saturating_sub(used);
    }

    /// Fit evidence in ranking order; survivors keep their input order.
    fn fit_evidence(&mut self, mut evidence: Vec<EvidenceItem>) -> (Vec<EvidenceItem>, usize) {
        let mut keep = vec![false; evidence.len()];
        let mut shortened = 0;
        for i in rank_by_confidence(&evidence) {
            let item = &mut evidence[i];
            let Some(allowance) = self.allowance(&item.label) else {
                continue;
            };
            if item.truncate_content(allowance) {
                shortened += 1;
            }
            self.spend(&item.label, item.content().chars().count());
            keep[i] = true;
        }

        let kept = evidence
            .into_iter()
            .zip(keep)
            .filter_map(|(item, kept)| kept.then_some(item))
            .collect();
        (kept, shortened)
    }

    /// Fit exemplars, which arrive most similar first.
    fn fit_exemplars(&mut self, exemplars: Vec<RetrievalResult>) -> (Vec<RetrievalResult>, usize) {
        let mut kept = Vec::with_capacity(exemplars.len());
        let mut shortened = 0;
        for mut exemplar in exemplars {
            let Some(allowance) = self.allowance(&exemplar.source_label) else {
                continue;
            };
            let trimmed = exemplar.content.trim();
            if trimmed.chars().count() > allowance {
                exemplar.content = truncate_chars(trimmed, allowance);
                shortened += 1;
            }
            self.spend(&exemplar.source_label, exemplar.content.chars().count());
            kept.push(exemplar);
        }
        (kept, shortened)
    }
}

/// Indices of `evidence`, highest confidence first, ties in input order.
fn rank_by_confidence(evidence: &[EvidenceItem]) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..evidence.len()).collect();
    // sort_by is stable, so equal confidences keep input order
    ranked.sort_by(|&a, &b| {
        evidence[b]
            .ranking_confidence()
            .partial_cmp(&evidence[a].ranking_confidence())
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

/// Keep the `max` highest-confidence items, ties and output in input order.
pub fn cap_evidence(evidence: Vec<EvidenceItem>, max: usize) -> Vec<EvidenceItem> {
    if evidence.len() <= max {
        return evidence;
    }

    let mut ranked = rank_by_confidence(&evidence);
    ranked.truncate(max);
    ranked.sort_unstable();

    let mut keep = vec![false; evidence.len()];
    for i in ranked {
        keep[i] = true;
    }
    evidence
        .into_iter()
        .zip(keep)
        .filter_map(|(item, kept)| kept.then_some(item))
        .collect()
}

/// Keep the `max` most similar exemplars, most similar first.
pub fn cap_exemplars(mut exemplars: Vec<RetrievalResult>, max: usize) -> Vec<RetrievalResult> {
    exemplars.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    exemplars.truncate(max);
    exemplars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::evidence::EvidenceKind;

    fn item(id: &str, confidence: Option<f32>) -> EvidenceItem {
        EvidenceItem {
            source_id: id.to_string(),
            label: format!("{id}.jpg"),
            confidence,
            kind: EvidenceKind::NarrativeText {
                text: format!("observation {id}"),
            },
        }
    }

    fn exemplar(id: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            record_id: id.to_string(),
            content: format!("exemplar {id}"),
            similarity,
            section_type: "executive_summary".into(),
            source_label: format!("SOR {id}"),
        }
    }

    #[test]
    fn test_unknown_section_type_is_rejected() {
        let err = PromptAssembler::default()
            .assemble("appendix_z", ProjectContext::new("P"), vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, DraftingError::Validation { .. }));
    }

    #[test]
    fn test_cap_evidence_keeps_order_of_survivors() {
        let evidence = vec![
            item("a", Some(0.2)),
            item("b", Some(0.9)),
            item("c", Some(0.5)),
            item("d", Some(0.9)),
        ];
        let kept = cap_evidence(evidence, 2);
        let ids: Vec<_> = kept.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn test_cap_evidence_ties_favor_earlier_items() {
        let evidence = vec![item("a", None), item("b", Some(1.0)), item("c", None)];
        let kept = cap_evidence(evidence, 2);
        let ids: Vec<_> = kept.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_exemplars_sorted_and_capped() {
        let assembler = PromptAssembler::new(DraftingPolicy::default(), 20, 2);
        let request = assembler
            .assemble(
                "executive_summary",
                ProjectContext::new("Riverside Lofts"),
                vec![],
                vec![exemplar("1", 0.4), exemplar("2", 0.9), exemplar("3", 0.7)],
            )
            .unwrap();
        let ids: Vec<_> = request.exemplars.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(request.truncated.exemplars_dropped, 1);
    }

    #[test]
    fn test_policy_is_substitutable() {
        let policy = DraftingPolicy::default().with_instructions("Write plainly.");
        let assembler = PromptAssembler::new(policy, 20, 5);
        let request = assembler
            .assemble_section(
                SectionType::Recommendations,
                ProjectContext::new("P"),
                vec![item("a", None)],
                vec![],
            )
            .unwrap();
        assert_eq!(request.instructions, "Write plainly.");
        assert_eq!(request.policy_hash, policy_hash("Write plainly."));
        assert!(request.is_generic());
    }

    #[test]
    fn test_evidence_without_source_is_rejected() {
        let err = PromptAssembler::default()
            .assemble_section(
                SectionType::SiteObservations,
                ProjectContext::new("P"),
                vec![item("", None)],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, DraftingError::Validation { .. }));
    }

    #[test]
    fn test_oversized_exemplars_fit_prompt_budget() {
        let config = DraftingConfig::default();
        let exemplars: Vec<_> = (1..=5)
            .map(|i| RetrievalResult {
                content: "It was observed that the work is ongoing. ".repeat(5_000),
                ..exemplar(&i.to_string(), 0.9 - i as f32 * 0.1)
            })
            .collect();

        let request = PromptAssembler::from_config(&config)
            .assemble_section(
                SectionType::SiteObservations,
                ProjectContext::new("Riverside Lofts"),
                vec![item("a", Some(0.9))],
                exemplars,
            )
            .unwrap();

        let payload = request.render();
        let rendered = payload.system.chars().count() + payload.user.chars().count();
        assert!(rendered <= config.max_prompt_chars, "rendered {rendered} chars");
        assert_eq!(request.exemplars.len(), 5);
        assert_eq!(request.truncated.exemplars_shortened, 5);
        assert_eq!(request.truncated.evidence_shortened, 0);
        assert!(request
            .exemplars
            .iter()
            .all(|x| x.content.chars().count() <= config.max_entry_chars));
    }

    #[test]
    fn test_budget_favors_evidence_over_exemplars() {
        let policy = DraftingPolicy::default().with_instructions("Be formal.");
        // instructions 10 + frame 800 + "- Project: P\n" 13 leaves 377
        let assembler = PromptAssembler::new(policy, 20, 5).with_prompt_budget(1_200, 3_200);
        let exemplars: Vec<_> = (1..=3)
            .map(|i| RetrievalResult {
                content: "y".repeat(1_000),
                ..exemplar(&i.to_string(), 0.9 - i as f32 * 0.1)
            })
            .collect();

        let request = assembler
            .assemble_section(
                SectionType::SiteObservations,
                ProjectContext::new("P"),
                vec![item("a", None)],
                exemplars,
            )
            .unwrap();

        assert_eq!(request.evidence.len(), 1);
        assert_eq!(request.evidence[0].content(), "observation a");
        assert_eq!(request.exemplars.len(), 1);
        assert_eq!(request.exemplars[0].record_id, "1");
        assert_eq!(request.exemplars[0].content.chars().count(), 258);
        assert_eq!(
            request.truncated,
            Truncation {
                evidence_dropped: 0,
                exemplars_dropped: 2,
                evidence_shortened: 0,
                exemplars_shortened: 1,
            }
        );
    }

    #[test]
    fn test_long_evidence_is_cut_to_entry_limit() {
        let assembler = PromptAssembler::default().with_prompt_budget(24_000, 100);
        let long = EvidenceItem {
            kind: EvidenceKind::NarrativeText {
                text: "z".repeat(500),
            },
            ..item("n", None)
        };
        let request = assembler
            .assemble_section(SectionType::SiteObservations, ProjectContext::new("P"), vec![long], vec![])
            .unwrap();
        assert_eq!(request.evidence[0].content().chars().count(), 100);
        assert_eq!(request.truncated.evidence_shortened, 1);
        assert_eq!(request.truncated.evidence_dropped, 0);
    }
}
