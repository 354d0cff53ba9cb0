//! Evidence-Grounded Report Drafting Library
//!
//! Drafts sections of construction Site Observation Reports from site
//! photos, project documents and field narrative, styled after previously
//! written reports retrieved by semantic similarity.
//!
//! # Design Philosophy
//!
//! - Evidence first: every claim in a draft cites an item that was supplied
//! - Exemplars shape tone and structure, never facts
//! - Degrade instead of failing: a broken photo is a warning, not an outage
//! - Library handles mechanics, app handles storage and review
//!
//! # Usage
//!
//! ```rust,ignore
//! use report_drafting::{Collaborators, DraftingConfig, SectionDrafter, SectionRequest};
//! use report_drafting::{ProjectContext, SectionType};
//!
//! let drafter = SectionDrafter::new(collaborators, DraftingConfig::from_env()?);
//!
//! let request = SectionRequest::new(SectionType::SiteObservations, ProjectContext::new("Riverside Commons"))
//!     .with_images(["img-1", "img-2"])
//!     .with_documents(["prior-sor-11"])
//!     .with_narrative("Roofing crew on site; level 3 deck poured.");
//!
//! let outcome = drafter.draft_section(&request).await?;
//! for reference in &outcome.draft.evidence_references {
//!     println!("cited {} {}", reference.source_type, reference.label);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (vision, parser, embedder, generator, index, assets)
//! - [`types`] - Report sections, evidence, retrieval records, drafts and config
//! - [`pipeline`] - Collection, retrieval, assembly, synthesis, building classification and style rewriting
//! - [`stores`] - Embedding index implementations (MemoryIndex)
//! - [`testing`] - Mock collaborators and seed exemplars

pub mod error;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(any(feature = "openai", feature = "ollama"))]
pub mod providers;

// Re-export core types at crate root
pub use error::{DraftingError, Result};
pub use traits::{
    ai::{DocumentParser, Embedder, Generator, VisionAnalyzer},
    assets::{AssetSource, DocumentAsset, ImageAsset},
    index::EmbeddingIndex,
};
pub use types::{
    analysis::{Condition, DocumentType, ParsedFields, Severity, VisionAnalysis},
    building::{BuildingMatch, BuildingProfile, Classification, LearnedFeatures},
    config::{ConfidencePolicy, DraftingConfig, DraftingPolicy},
    draft::{
        DraftSection, DraftStatus, EvidenceReference, GenerationRequest, PromptPayload, Truncation,
        UnmatchedCitation,
    },
    evidence::{CollectedEvidence, CollectionWarning, EvidenceItem, EvidenceKind, SourceType},
    retrieval::{EmbeddingRecord, QueryContext, RecordId, RecordMetadata, RetrievalResult},
    section::{ProjectContext, SectionType},
    style::{
        IngestedSection, RewriteContext, RewriteStyle, SampleAnalysis, SampleReport, SampleSection,
        StyleProfile,
    },
};

// Re-export pipeline components
pub use pipeline::{
    assemble::PromptAssembler,
    citations::{resolve_citations, resolve_marker, ResolvedCitations},
    classify::{building_record_id, BuildingClassifier, BUILDING_NAMESPACE},
    collect::{EvidenceCollector, EvidenceRequest},
    drafter::{Collaborators, SectionDrafter, SectionOutcome, SectionRequest},
    retrieval::{build_query, RetrievalEngine},
    rewrite::StyleRewriter,
    synthesize::DraftSynthesizer,
};

// Re-export stores
pub use stores::MemoryIndex;

// Re-export testing utilities
pub use testing::{MemoryAssetSource, MockEmbedder, MockParser, MockVision};
