//! The SectionDrafter - main entry point for drafting report sections.
//!
//! Per section: collect evidence and retrieve exemplars concurrently,
//! assemble a capped request, then synthesize with one retry.
//!
//! ```rust,ignore
//! let drafter = SectionDrafter::new(collaborators, DraftingConfig::default());
//!
//! let request = SectionRequest::new(SectionType::SiteObservations, project)
//!     .with_images(["img-1", "img-2"])
//!     .with_documents(["doc-7"])
//!     .with_narrative("Roofing crew on site.");
//!
//! let outcome = drafter.draft_section(&request).await?;
//! ```

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    assemble::PromptAssembler,
    collect::{EvidenceCollector, EvidenceRequest},
    retrieval::RetrievalEngine,
    synthesize::DraftSynthesizer,
};
use crate::error::{DraftingError, Result};
use crate::traits::{
    ai::{DocumentParser, Embedder, Generator, VisionAnalyzer},
    assets::AssetSource,
    index::EmbeddingIndex,
};
use crate::types::{
    config::DraftingConfig,
    draft::{DraftSection, Truncation},
    evidence::CollectionWarning,
    retrieval::QueryContext,
    section::{ProjectContext, SectionType},
};

/// The external capabilities a drafter needs.
#[derive(Clone)]
pub struct Collaborators {
    pub vision: Arc<dyn VisionAnalyzer>,
    pub parser: Arc<dyn DocumentParser>,
    pub assets: Arc<dyn AssetSource>,
    pub index: Arc<dyn EmbeddingIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
}

/// Everything needed to draft one section.
#[derive(Debug, Clone)]
pub struct SectionRequest {
    pub project_context: ProjectContext,
    pub evidence: EvidenceRequest,

    /// Building type and known issues used for exemplar retrieval
    pub query: QueryContext,
}

impl SectionRequest {
    pub fn new(section_type: SectionType, project_context: ProjectContext) -> Self {
        Self {
            project_context,
            evidence: EvidenceRequest::new(section_type),
            query: QueryContext::default(),
        }
    }

    pub fn section_type(&self) -> SectionType {
        self.evidence.section_type
    }

    pub fn with_images(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.evidence = self.evidence.with_images(ids);
        self
    }

    pub fn with_documents(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.evidence = self.evidence.with_documents(ids);
        self
    }

    pub fn with_narrative(mut self, text: impl Into<String>) -> Self {
        self.evidence = self.evidence.with_narrative(text);
        self
    }

    /// Fail the section if this image or document cannot be collected.
    pub fn require(mut self, id: impl Into<String>) -> Self {
        self.evidence = self.evidence.require(id);
        self
    }

    pub fn with_query(mut self, query: QueryContext) -> Self {
        self.query = query;
        self
    }
}

/// A drafted section plus what happened along the way.
#[derive(Debug, Clone)]
pub struct SectionOutcome {
    pub draft: DraftSection,

    /// Evidence items skipped during collection
    pub warnings: Vec<CollectionWarning>,

    /// Items dropped by the request caps
    pub truncated: Truncation,

    /// Hash of the policy text the draft was generated under
    pub policy_hash: String,
}

/// Drafts report sections from evidence and retrieved exemplars.
pub struct SectionDrafter {
    collector: EvidenceCollector,
    retrieval: RetrievalEngine,
    assembler: PromptAssembler,
    synthesizer: DraftSynthesizer,
    config: DraftingConfig,
}

impl SectionDrafter {
    pub fn new(collaborators: Collaborators, config: DraftingConfig) -> Self {
        let Collaborators {
            vision,
            parser,
            assets,
            index,
            embedder,
            generator,
        } = collaborators;

        Self {
            collector: EvidenceCollector::new(vision, parser, assets, config.clone()),
            retrieval: RetrievalEngine::new(index, embedder, config.clone()),
            assembler: PromptAssembler::from_config(&config),
            synthesizer: DraftSynthesizer::new(generator, &config),
            config,
        }
    }

    pub fn config(&self) -> &DraftingConfig {
        &self.config
    }

    /// The retrieval engine, for exemplar ingestion.
    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    /// Draft one section.
    ///
    /// Fails only when a required evidence item cannot be collected or the
    /// request is invalid. Retrieval trouble degrades to a generic draft and
    /// synthesis trouble to a [`Failed`](crate::types::draft::DraftStatus::Failed)
    /// section.
    pub async fn draft_section(&self, request: &SectionRequest) -> Result<SectionOutcome> {
        let section_type = request.section_type();

        let (collected, exemplars) = tokio::join!(
            self.collector.collect_request(&request.evidence),
            self.retrieval.retrieve_for(section_type, &request.query),
        );
        let collected = collected?;
        let exemplars = exemplars.unwrap_or_else(|e| {
            warn!(section = %section_type, error = %e, "Exemplar retrieval failed, drafting without style examples");
            Vec::new()
        });

        let generation = self.assembler.assemble_section(
            section_type,
            request.project_context.clone(),
            collected.items,
            exemplars,
        )?;
        let draft = self.synthesizer.synthesize_with_retry(&generation).await;

        info!(
            section = %section_type,
            status = ?draft.status,
            confidence = draft.confidence,
            references = draft.evidence_references.len(),
            "Drafted section"
        );

        Ok(SectionOutcome {
            draft,
            warnings: collected.warnings,
            truncated: generation.truncated,
            policy_hash: generation.policy_hash,
        })
    }

    /// Draft one section, giving up with `DraftingError::Cancelled` when
    /// `cancel` fires first.
    pub async fn draft_section_with_cancel(
        &self,
        request: &SectionRequest,
        cancel: CancellationToken,
    ) -> Result<SectionOutcome> {
        tokio::select! {
            result = self.draft_section(request) => result,
            _ = cancel.cancelled() => Err(DraftingError::Cancelled),
        }
    }

    /// Draft many sections, at most `max_concurrent_sections` at a time.
    ///
    /// Results come back in request order. A section that fails is returned
    /// as a failed draft; it never aborts its siblings.
    pub async fn draft_sections(&self, requests: &[SectionRequest]) -> Vec<SectionOutcome> {
        let mut outcomes: Vec<(usize, SectionOutcome)> = stream::iter(requests.iter().enumerate())
            .map(|(i, request)| async move {
                let outcome = match self.draft_section(request).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(section = %request.section_type(), error = %e, "Section drafting failed");
                        SectionOutcome {
                            draft: DraftSection::failed(request.section_type(), e.to_string()),
                            warnings: Vec::new(),
                            truncated: Truncation::default(),
                            policy_hash: String::new(),
                        }
                    }
                };
                (i, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_sections.max(1))
            .collect()
            .await;

        outcomes.sort_by_key(|(i, _)| *i);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
