//! OpenAI implementation of the model collaborators.
//!
//! One client backs all four traits: vision and document parsing use JSON
//! mode, generation uses plain chat completions.
//!
//! # Example
//!
//! ```rust,ignore
//! use report_drafting::providers::OpenAI;
//!
//! let config = DraftingConfig::from_env()?;
//! let ai = Arc::new(OpenAI::from_env()?.with_config(&config));
//! let collaborators = Collaborators {
//!     vision: ai.clone(),
//!     parser: ai.clone(),
//!     embedder: ai.clone(),
//!     generator: ai,
//!     ..
//! };
//! ```

use async_trait::async_trait;
use base64::Engine;
use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};
use std::time::Duration;
use tracing::debug;

use crate::error::{DraftingError, Result};
use crate::pipeline::prompts::{
    format_document_prompt, json_object_slice, DOCUMENT_PARSE_SYSTEM, VISION_PROMPT,
};
use crate::traits::ai::{DocumentParser, Embedder, Generator, VisionAnalyzer};
use crate::types::{
    analysis::{DocumentType, ParsedFields, VisionAnalysis},
    config::DraftingConfig,
    draft::PromptPayload,
};

/// OpenAI-backed vision, parsing, embedding and generation.
#[derive(Clone)]
pub struct OpenAI {
    client: OpenAIClient,
    model: String,
    vision_model: String,
    embedding_model: String,
    embedding_dimension: usize,
    max_document_chars: usize,
}

impl OpenAI {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: OpenAIClient::new(api_key),
            model: "gpt-4o".to_string(),
            vision_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            max_document_chars: DraftingConfig::default().max_document_chars,
        }
    }

    /// Create from `OPENAI_API_KEY`, with optional `OPENAI_MODEL`,
    /// `OPENAI_VISION_MODEL` and `OPENAI_EMBEDDING_MODEL` overrides.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| DraftingError::Config("OPENAI_API_KEY not set".into()))?;
        let mut provider = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            provider.model = model;
        }
        if let Ok(model) = std::env::var("OPENAI_VISION_MODEL") {
            provider.vision_model = model;
        }
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            provider.embedding_model = model;
        }
        Ok(provider)
    }

    /// Set the chat model used for parsing and generation.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    /// Set the embedding model and its output dimension.
    pub fn with_embedding_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = model.into();
        self.embedding_dimension = dimension;
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    pub fn with_max_document_chars(mut self, max_chars: usize) -> Self {
        self.max_document_chars = max_chars;
        self
    }

    /// Apply pipeline settings the provider honours (document truncation).
    pub fn with_config(self, config: &DraftingConfig) -> Self {
        self.with_max_document_chars(config.max_document_chars)
    }

    async fn json_completion(&self, request: ChatRequest) -> std::result::Result<serde_json::Value, String> {
        let response = self
            .client
            .chat_completion(request.json_mode())
            .await
            .map_err(|e| e.to_string())?;
        let json = json_object_slice(&response.content)
            .ok_or_else(|| "model reply contained no JSON object".to_string())?;
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

fn generation_error(e: OpenAIError, timeout: Duration) -> DraftingError {
    match e {
        OpenAIError::Timeout(_) => DraftingError::Timeout {
            operation: "generate".to_string(),
            after_ms: timeout.as_millis() as u64,
        },
        other => DraftingError::GenerationService {
            retryable: other.is_retryable(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAI {
    async fn analyze(&self, image: &[u8], mime_type: &str) -> Result<VisionAnalysis> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{mime_type};base64,{encoded}");

        let request = ChatRequest::new(&self.vision_model)
            .message(Message::user_with_image(VISION_PROMPT, data_url))
            .max_output_tokens(1000);

        let json = self
            .json_completion(request)
            .await
            .map_err(DraftingError::VisionService)?;
        let analysis: VisionAnalysis = serde_json::from_value(json)
            .map_err(|e| DraftingError::VisionService(format!("unexpected analysis shape: {e}")))?;

        debug!(
            model = %self.vision_model,
            conditions = analysis.conditions.len(),
            "Analyzed image"
        );
        Ok(analysis)
    }
}

#[async_trait]
impl DocumentParser for OpenAI {
    async fn parse(&self, document: &[u8], doc_type: &DocumentType) -> Result<ParsedFields> {
        let text = String::from_utf8_lossy(document);
        let prompt = format_document_prompt(doc_type, &text, self.max_document_chars);

        let request = ChatRequest::new(&self.model)
            .message(Message::system(DOCUMENT_PARSE_SYSTEM))
            .message(Message::user(prompt))
            .max_output_tokens(2000);

        let json = self.json_completion(request).await.map_err(DraftingError::Parse)?;
        match json {
            serde_json::Value::Object(fields) => Ok(fields),
            other => Err(DraftingError::Parse(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl Embedder for OpenAI {
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client
            .create_embedding(text, &self.embedding_model)
            .await
            .map_err(|e| DraftingError::EmbeddingService(e.to_string()))
    }
}

#[async_trait]
impl Generator for OpenAI {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn generate(&self, payload: &PromptPayload, timeout: Duration) -> Result<String> {
        let request = ChatRequest::new(&self.model)
            .message(Message::system(&payload.system))
            .message(Message::user(&payload.user))
            .temperature(0.3)
            .max_output_tokens(2000);

        let response = self
            .client
            .chat_completion_with_timeout(request, timeout)
            .await
            .map_err(|e| generation_error(e, timeout))?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let ai = OpenAI::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_embedding_model("text-embedding-3-large", 3072);

        assert_eq!(ai.model_name(), "gpt-4o-mini");
        assert_eq!(ai.dimension(), 3072);
        assert_eq!(ai.vision_model, "gpt-4o");
        assert_eq!(ai.max_document_chars, 15_000);
    }

    #[test]
    fn test_with_config_sets_document_truncation() {
        let config = DraftingConfig::default().with_max_document_chars(4_000);
        let ai = OpenAI::new("sk-test").with_config(&config);
        assert_eq!(ai.max_document_chars, 4_000);
    }

    #[test]
    fn test_generation_error_keeps_retryability() {
        let timeout = Duration::from_secs(30);
        let rate_limited = generation_error(
            OpenAIError::Api {
                status: 429,
                message: "slow down".into(),
            },
            timeout,
        );
        assert!(rate_limited.is_retryable());

        let rejected = generation_error(
            OpenAIError::Api {
                status: 400,
                message: "bad request".into(),
            },
            timeout,
        );
        assert!(!rejected.is_retryable());

        assert!(matches!(
            generation_error(OpenAIError::Timeout("deadline".into()), timeout),
            DraftingError::Timeout { after_ms: 30_000, .. }
        ));
    }
}
