//! Testing utilities including mock implementations.
//!
//! Deterministic stand-ins for the vision, parser, embedding and generation
//! collaborators plus an in-memory asset source, so applications can test
//! drafting flows without network calls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{DraftingError, Result};
use crate::pipeline::retrieval::RetrievalEngine;
use crate::traits::{
    ai::{DocumentParser, Embedder, Generator, VisionAnalyzer},
    assets::{AssetSource, DocumentAsset, ImageAsset},
    index::EmbeddingIndex,
};
use crate::types::{
    analysis::{DocumentType, ParsedFields, VisionAnalysis},
    draft::PromptPayload,
    retrieval::{EmbeddingRecord, RecordId, RecordMetadata, RetrievalResult},
    section::SectionType,
};

/// A mock embedder.
///
/// Unknown texts get a deterministic vector seeded from their SHA-256, so
/// equal texts always embed equally.
#[derive(Default)]
pub struct MockEmbedder {
    dimension: usize,
    vectors: Arc<RwLock<HashMap<String, Vec<f32>>>>,
    fail: bool,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    /// Predefine the vector for a text.
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.write().unwrap().insert(text.into(), vector);
        self
    }

    /// Fail every call with `DraftingError::EmbeddingService`.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Texts embedded so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn deterministic_vector(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = hasher.finalize();

        (0..self.dimension)
            .map(|i| {
                let byte = hash[i % 32] as f32;
                // Normalize to [-1, 1] range
                (byte / 127.5) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.write().unwrap().push(text.to_string());
        if self.fail {
            return Err(DraftingError::EmbeddingService(
                "mock embedder unavailable".into(),
            ));
        }
        Ok(self
            .vectors
            .read()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.deterministic_vector(text)))
    }
}

/// A mock vision analyzer keyed by image bytes.
#[derive(Default)]
pub struct MockVision {
    analyses: Arc<RwLock<HashMap<Vec<u8>, VisionAnalysis>>>,
    failures: Arc<RwLock<HashSet<Vec<u8>>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<usize>>,
}

impl MockVision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `analysis` for images with these bytes.
    pub fn with_analysis(self, bytes: impl Into<Vec<u8>>, analysis: VisionAnalysis) -> Self {
        self.analyses.write().unwrap().insert(bytes.into(), analysis);
        self
    }

    /// Fail for images with these bytes.
    pub fn fail_on(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.failures.write().unwrap().insert(bytes.into());
        self
    }

    /// Sleep before answering, to exercise deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.read().unwrap()
    }
}

#[async_trait]
impl VisionAnalyzer for MockVision {
    async fn analyze(&self, image: &[u8], _mime_type: &str) -> Result<VisionAnalysis> {
        *self.calls.write().unwrap() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.read().unwrap().contains(image) {
            return Err(DraftingError::VisionService("mock vision failure".into()));
        }
        Ok(self
            .analyses
            .read()
            .unwrap()
            .get(image)
            .cloned()
            .unwrap_or_else(|| VisionAnalysis {
                description: "Site photograph".into(),
                ..Default::default()
            }))
    }
}

/// A mock document parser keyed by document bytes.
#[derive(Default)]
pub struct MockParser {
    fields: Arc<RwLock<HashMap<Vec<u8>, ParsedFields>>>,
    failures: Arc<RwLock<HashSet<Vec<u8>>>>,
}

impl MockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `fields` (a JSON object) for documents with these bytes.
    pub fn with_fields(self, bytes: impl Into<Vec<u8>>, fields: serde_json::Value) -> Self {
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.fields.write().unwrap().insert(bytes.into(), fields);
        self
    }

    /// Fail for documents with these bytes.
    pub fn fail_on(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.failures.write().unwrap().insert(bytes.into());
        self
    }
}

#[async_trait]
impl DocumentParser for MockParser {
    async fn parse(&self, document: &[u8], _doc_type: &DocumentType) -> Result<ParsedFields> {
        if self.failures.read().unwrap().contains(document) {
            return Err(DraftingError::Parse("mock parser failure".into()));
        }
        Ok(self
            .fields
            .read()
            .unwrap()
            .get(document)
            .cloned()
            .unwrap_or_default())
    }
}

/// One scripted generator reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Failure { reason: String, retryable: bool },

    /// Never answers within any realistic deadline
    Hang,
}

/// A mock generator with scripted replies and a call log.
///
/// Once the script runs out it answers with one sentence per evidence line
/// of the prompt, each citing that line's tag, so output is grounded by
/// construction.
#[derive(Default)]
pub struct MockGenerator {
    script: Arc<RwLock<VecDeque<MockReply>>>,
    calls: Arc<RwLock<Vec<PromptPayload>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(MockReply::Text(text.into()))
    }

    pub fn with_failure(self, reason: impl Into<String>, retryable: bool) -> Self {
        self.push(MockReply::Failure {
            reason: reason.into(),
            retryable,
        })
    }

    pub fn with_hang(self) -> Self {
        self.push(MockReply::Hang)
    }

    /// Prompts received so far.
    pub fn calls(&self) -> Vec<PromptPayload> {
        self.calls.read().unwrap().clone()
    }

    fn push(self, reply: MockReply) -> Self {
        self.script.write().unwrap().push_back(reply);
        self
    }

    fn grounded_reply(payload: &PromptPayload) -> String {
        let sentences: Vec<String> = payload
            .user
            .lines()
            .filter_map(|line| {
                let tag = line.strip_prefix('[')?.split_once(']')?.0;
                let is_evidence_tag = tag.len() > 1
                    && tag.starts_with('E')
                    && tag[1..].chars().all(|c| c.is_ascii_digit());
                is_evidence_tag
                    .then(|| format!("It was observed that the item was recorded [Evidence: {tag}]."))
            })
            .collect();

        if sentences.is_empty() {
            "No site evidence was available for this section; further investigation recommended."
                .to_string()
        } else {
            sentences.join(" ")
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn model_name(&self) -> String {
        "mock-generator".to_string()
    }

    async fn generate(&self, payload: &PromptPayload, _timeout: Duration) -> Result<String> {
        self.calls.write().unwrap().push(payload.clone());
        let reply = self.script.write().unwrap().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Failure { reason, retryable }) => {
                Err(DraftingError::GenerationService { reason, retryable })
            }
            Some(MockReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DraftingError::GenerationService {
                    reason: "mock generator hung".into(),
                    retryable: true,
                })
            }
            None => Ok(Self::grounded_reply(payload)),
        }
    }
}

/// In-memory asset source.
#[derive(Default)]
pub struct MemoryAssetSource {
    images: RwLock<HashMap<String, ImageAsset>>,
    documents: RwLock<HashMap<String, DocumentAsset>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, asset: ImageAsset) -> Self {
        self.images.write().unwrap().insert(asset.id.clone(), asset);
        self
    }

    pub fn with_document(self, asset: DocumentAsset) -> Self {
        self.documents
            .write()
            .unwrap()
            .insert(asset.id.clone(), asset);
        self
    }
}

#[async_trait]
impl AssetSource for MemoryAssetSource {
    async fn image(&self, id: &str) -> Result<ImageAsset> {
        self.images
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| DraftingError::AssetNotFound { id: id.to_string() })
    }

    async fn document(&self, id: &str) -> Result<DocumentAsset> {
        self.documents
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| DraftingError::AssetNotFound { id: id.to_string() })
    }
}

/// An embedding index that never answers.
///
/// Every call stays pending, for exercising deadlines.
pub struct StalledIndex {
    dimension: usize,
}

impl StalledIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingIndex for StalledIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, _record: EmbeddingRecord) -> Result<RecordId> {
        std::future::pending().await
    }

    async fn query(
        &self,
        _vector: &[f32],
        _section_filter: Option<&str>,
        _top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        std::future::pending().await
    }

    async fn get(&self, _id: &str) -> Result<Option<EmbeddingRecord>> {
        std::future::pending().await
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        std::future::pending().await
    }

    async fn update_metadata(&self, _id: &str, _metadata: RecordMetadata) -> Result<bool> {
        std::future::pending().await
    }

    async fn len(&self) -> Result<usize> {
        std::future::pending().await
    }
}

/// Historical sections for seeding an index in demos and tests.
pub fn example_sections() -> Vec<(SectionType, &'static str, &'static str)> {
    vec![
        (
            SectionType::ExecutiveSummary,
            "SOR #11 (2026-02-10)",
            "During the February 10, 2026 site observation, work was observed to be progressing \
             in accordance with the approved construction schedule. Building A exterior facade \
             installation is approximately 85% complete. Building B structural framing has been \
             completed and interior rough-in work has commenced. No significant safety concerns \
             were observed during the site visit.",
        ),
        (
            SectionType::BuildingStatus,
            "SOR #11 (2026-02-10)",
            "The structural steel framing for Building B has been completed and accepted by the \
             structural engineer of record. Exterior metal stud framing is approximately 75% \
             complete. Window installation has commenced on the south and east elevations \
             [Evidence: IMG_045.jpg, IMG_046.jpg]. Minor punch list items have been documented \
             and communicated to the general contractor.",
        ),
        (
            SectionType::BudgetSummary,
            "SOR #11 (2026-02-10)",
            "As of the February 2026 payment application, the project has expended $12,450,000 \
             against an approved budget of $18,500,000, representing 67.3% of the total contract \
             value. Change orders approved to date total $485,000. The project remains within \
             budget parameters.",
        ),
        (
            SectionType::SiteObservations,
            "SOR #10 (2026-01-13)",
            "Ponding water was observed at the northeast roof drain of Building A. The roof \
             membrane appears to be intact; further investigation recommended once the area has \
             dried. Sealant at the level 2 window perimeters was observed to be cracked.",
        ),
    ]
}

/// Ingest [`example_sections`] through a retrieval engine.
pub async fn seed_example_sections(engine: &RetrievalEngine) -> Result<Vec<RecordId>> {
    let mut ids = Vec::new();
    for (section_type, label, content) in example_sections() {
        ids.push(
            engine
                .ingest_exemplar(section_type, label, content, RecordMetadata::exemplar())
                .await?,
        );
    }
    Ok(ids)
}
