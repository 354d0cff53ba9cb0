//! Configuration for the drafting pipeline.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DraftingError, Result};

/// Default writing policy embedded in every generation request.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are a professional construction consultant writing a Site Observation Report.

Your writing must:
1. Use formal, technical language appropriate for engineering reports
2. Use passive voice for observations ("It was observed that...")
3. Cite every evidence item you use with [Evidence: <tag or label>], e.g. [Evidence: E2] or [Evidence: IMG_045.jpg]
4. Include specific dates and locations when available
5. Follow the structure and tone of the style exemplars, but never cite them as facts

CRITICAL RULES:
- Never state anything that is not present in the evidence
- Never fabricate observations, quantities, dates or evidence labels
- Flag any inferred but not directly observed claim with "appears to" or "further investigation recommended"
- Use standard construction terminology"#;

/// Writing policy: instruction text plus the vocabulary used to audit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftingPolicy {
    /// Instruction block sent as the system prompt
    pub instructions: String,

    /// Phrases that mark a claim as hedged
    pub hedge_phrases: Vec<String>,

    /// Words that signal an inferred (not directly observed) claim
    pub inference_markers: Vec<String>,
}

impl Default for DraftingPolicy {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            hedge_phrases: vec![
                "appears to".to_string(),
                "further investigation recommended".to_string(),
            ],
            inference_markers: vec![
                "likely".to_string(),
                "probably".to_string(),
                "suggests".to_string(),
                "indicates".to_string(),
                "presumably".to_string(),
                "may have".to_string(),
            ],
        }
    }
}

impl DraftingPolicy {
    /// Replace the instruction text, keeping the audit vocabulary.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// Weights of the draft confidence heuristic.
///
/// Best-effort scoring, tunable per deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePolicy {
    /// Weight of "share of supplied sources actually cited"
    pub coverage_weight: f32,

    /// Weight of "no inference left unhedged"
    pub hedge_weight: f32,

    /// Coverage term used when no evidence was supplied at all
    pub no_evidence_score: f32,

    /// Subtracted per citation marker that matched nothing
    pub unmatched_marker_penalty: f32,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            coverage_weight: 0.7,
            hedge_weight: 0.3,
            no_evidence_score: 0.3,
            unmatched_marker_penalty: 0.05,
        }
    }
}

/// Configuration for the drafting pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftingConfig {
    /// Evidence items kept per request (highest confidence wins). Default: 20.
    pub max_evidence_items: usize,

    /// Exemplars kept per request (highest similarity wins). Default: 5.
    pub max_exemplars: usize,

    /// Exemplars fetched from the index. Default: 5.
    pub retrieval_top_k: usize,

    /// Exemplars below this similarity are discarded. Default: 0.0.
    pub min_similarity: f32,

    /// Inclusive similarity threshold for a confident building match. Default: 0.75.
    pub confidence_threshold: f32,

    /// Building matches reported per classification. Default: 3.
    pub max_building_matches: usize,

    pub asset_timeout_ms: u64,
    pub vision_timeout_ms: u64,
    pub parser_timeout_ms: u64,
    pub embedding_timeout_ms: u64,
    pub generation_timeout_ms: u64,

    /// Sections drafted in parallel by `draft_sections`. Default: 4.
    pub max_concurrent_sections: usize,

    /// Document text is truncated to this many characters before parsing.
    pub max_document_chars: usize,

    /// Character budget of a rendered generation prompt (about 4 chars per
    /// token). Default: 24000.
    pub max_prompt_chars: usize,

    /// Longest evidence or exemplar text kept in a prompt. Default: 3200.
    pub max_entry_chars: usize,

    #[serde(default)]
    pub policy: DraftingPolicy,

    #[serde(default)]
    pub confidence: ConfidencePolicy,
}

impl Default for DraftingConfig {
    fn default() -> Self {
        Self {
            max_evidence_items: 20,
            max_exemplars: 5,
            retrieval_top_k: 5,
            min_similarity: 0.0,
            confidence_threshold: 0.75,
            max_building_matches: 3,
            asset_timeout_ms: 30_000,
            vision_timeout_ms: 60_000,
            parser_timeout_ms: 60_000,
            embedding_timeout_ms: 30_000,
            generation_timeout_ms: 120_000,
            max_concurrent_sections: 4,
            max_document_chars: 15_000,
            max_prompt_chars: 24_000,
            max_entry_chars: 3_200,
            policy: DraftingPolicy::default(),
            confidence: ConfidencePolicy::default(),
        }
    }
}

impl DraftingConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from `REPORT_DRAFTING_*` environment variables.
    ///
    /// A `.env` file is read first when present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        override_from_env("REPORT_DRAFTING_MAX_EVIDENCE_ITEMS", &mut config.max_evidence_items)?;
        override_from_env("REPORT_DRAFTING_MAX_EXEMPLARS", &mut config.max_exemplars)?;
        override_from_env("REPORT_DRAFTING_RETRIEVAL_TOP_K", &mut config.retrieval_top_k)?;
        override_from_env("REPORT_DRAFTING_MIN_SIMILARITY", &mut config.min_similarity)?;
        override_from_env(
            "REPORT_DRAFTING_CONFIDENCE_THRESHOLD",
            &mut config.confidence_threshold,
        )?;
        override_from_env("REPORT_DRAFTING_ASSET_TIMEOUT_MS", &mut config.asset_timeout_ms)?;
        override_from_env("REPORT_DRAFTING_VISION_TIMEOUT_MS", &mut config.vision_timeout_ms)?;
        override_from_env("REPORT_DRAFTING_PARSER_TIMEOUT_MS", &mut config.parser_timeout_ms)?;
        override_from_env(
            "REPORT_DRAFTING_EMBEDDING_TIMEOUT_MS",
            &mut config.embedding_timeout_ms,
        )?;
        override_from_env(
            "REPORT_DRAFTING_GENERATION_TIMEOUT_MS",
            &mut config.generation_timeout_ms,
        )?;
        override_from_env(
            "REPORT_DRAFTING_MAX_CONCURRENT_SECTIONS",
            &mut config.max_concurrent_sections,
        )?;
        override_from_env(
            "REPORT_DRAFTING_MAX_DOCUMENT_CHARS",
            &mut config.max_document_chars,
        )?;
        override_from_env("REPORT_DRAFTING_MAX_PROMPT_CHARS", &mut config.max_prompt_chars)?;
        override_from_env("REPORT_DRAFTING_MAX_ENTRY_CHARS", &mut config.max_entry_chars)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_sections == 0 {
            return Err(DraftingError::Config(
                "max_concurrent_sections must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DraftingError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(DraftingError::Config(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        if self.max_document_chars == 0 {
            return Err(DraftingError::Config(
                "max_document_chars must be at least 1".into(),
            ));
        }
        if self.max_entry_chars == 0 || self.max_prompt_chars < self.max_entry_chars {
            return Err(DraftingError::Config(format!(
                "max_prompt_chars ({}) must be at least max_entry_chars ({}), which must be positive",
                self.max_prompt_chars, self.max_entry_chars
            )));
        }
        Ok(())
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_millis(self.vision_timeout_ms)
    }

    pub fn parser_timeout(&self) -> Duration {
        Duration::from_millis(self.parser_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Set the evidence cap.
    pub fn with_max_evidence_items(mut self, max: usize) -> Self {
        self.max_evidence_items = max;
        self
    }

    /// Set the exemplar cap.
    pub fn with_max_exemplars(mut self, max: usize) -> Self {
        self.max_exemplars = max;
        self
    }

    /// Set the minimum exemplar similarity.
    pub fn with_min_similarity(mut self, min: f32) -> Self {
        self.min_similarity = min;
        self
    }

    /// Set the building match threshold.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the generation deadline.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the same deadline for asset, vision, parser and embedding calls.
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        let ms = timeout.as_millis() as u64;
        self.asset_timeout_ms = ms;
        self.vision_timeout_ms = ms;
        self.parser_timeout_ms = ms;
        self.embedding_timeout_ms = ms;
        self
    }

    /// Set the document text truncation length.
    pub fn with_max_document_chars(mut self, max: usize) -> Self {
        self.max_document_chars = max;
        self
    }

    /// Set the prompt character budget and the per-entry limit.
    pub fn with_prompt_budget(mut self, max_prompt_chars: usize, max_entry_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self.max_entry_chars = max_entry_chars;
        self
    }

    /// Replace the writing policy.
    pub fn with_policy(mut self, policy: DraftingPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn override_from_env<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    match env::var(key) {
        Ok(raw) => {
            *target = raw
                .trim()
                .parse()
                .map_err(|_| DraftingError::Config(format!("{key} has invalid value {raw:?}")))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}
