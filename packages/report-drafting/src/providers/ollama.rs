//! Ollama implementation of the embedding and generation collaborators.
//!
//! Keeps report text on-premises: requests go only to the configured
//! Ollama host.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DraftingError, Result};
use crate::traits::ai::{Embedder, Generator};
use crate::types::draft::PromptPayload;

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama-backed embedding and generation.
#[derive(Clone)]
pub struct Ollama {
    client: Client,
    host: String,
    model: String,
    embedding_model: String,
    embedding_dimension: usize,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl Ollama {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    /// Create from `OLLAMA_HOST`, `LOCAL_MODEL` and `LOCAL_EMBEDDING_MODEL`.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let host =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());
        let mut provider = Self::new(host);
        if let Ok(model) = std::env::var("LOCAL_MODEL") {
            provider.model = model;
        }
        if let Ok(model) = std::env::var("LOCAL_EMBEDDING_MODEL") {
            provider.embedding_model = model;
        }
        provider
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the embedding model and its output dimension.
    pub fn with_embedding_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = model.into();
        self.embedding_dimension = dimension;
        self
    }

    /// Names of the models the host has pulled.
    pub async fn available_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| DraftingError::Config(format!("Ollama unreachable at {}: {e}", self.host)))?;
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| DraftingError::Config(format!("unexpected Ollama tags reply: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the host is reachable and has the configured chat model.
    pub async fn has_required_model(&self) -> bool {
        match self.available_models().await {
            Ok(models) => models
                .iter()
                .any(|m| m == &self.model || m.starts_with(&format!("{}:", self.model))),
            Err(e) => {
                warn!(error = %e, "Ollama connection check failed");
                false
            }
        }
    }
}

/// Connection trouble and 5xx are transient; other statuses are not.
fn generation_error(e: reqwest::Error, timeout: Duration) -> DraftingError {
    if e.is_timeout() {
        return DraftingError::Timeout {
            operation: "generate".to_string(),
            after_ms: timeout.as_millis() as u64,
        };
    }
    let retryable = e
        .status()
        .map_or(true, |s| s.is_server_error() || s.as_u16() == 429);
    DraftingError::GenerationService {
        reason: e.to_string(),
        retryable,
    }
}

#[async_trait]
impl Embedder for Ollama {
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let response: EmbeddingResponse = self
            .client
            .post(format!("{}/api/embeddings", self.host))
            .timeout(EMBEDDING_TIMEOUT)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DraftingError::EmbeddingService(e.to_string()))?
            .json()
            .await
            .map_err(|e| DraftingError::EmbeddingService(e.to_string()))?;

        if response.embedding.is_empty() {
            return Err(DraftingError::EmbeddingService(format!(
                "Ollama returned an empty embedding for model {}",
                self.embedding_model
            )));
        }
        Ok(response.embedding)
    }
}

#[async_trait]
impl Generator for Ollama {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn generate(&self, payload: &PromptPayload, timeout: Duration) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &payload.system,
                },
                ChatMessage {
                    role: "user",
                    content: &payload.user,
                },
            ],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let start = std::time::Instant::now();
        let response: ChatResponse = self
            .client
            .post(format!("{}/api/chat", self.host))
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| generation_error(e, timeout))?
            .json()
            .await
            .map_err(|e| DraftingError::GenerationService {
                reason: format!("unexpected Ollama reply: {e}"),
                retryable: true,
            })?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "Ollama chat completion"
        );
        Ok(response.message.map(|m| m.content).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_models() {
        let ollama = Ollama::new("http://localhost:11434/");
        assert_eq!(ollama.host, "http://localhost:11434");
        assert_eq!(ollama.model_name(), "llama3.2");
        assert_eq!(ollama.dimension(), 768);
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "llama3.2",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            stream: false,
            options: ChatOptions {
                temperature: 0.3,
                num_predict: 10,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 10);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
