//! Language model adapters used to answer grounded prompts.
//!
//! Both backends issue HTTP requests directly to the runtime, mirroring the embedding
//! adapters. Responses are returned exactly as the model produced them.

mod ollama;
mod openai;

pub use ollama::OllamaCompletionClient;
pub use openai::OpenAiCompletionClient;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LanguageModelError {
    /// Provider could not be reached or the model is missing.
    #[error("Language model unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed language model response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    /// Submit `prompt` and return the model's reply.
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError>;
}

/// Shared handle to a completion backend.
pub type SharedLanguageModelClient = Arc<dyn LanguageModelClient>;

/// Build a completion client for the configured provider.
pub fn get_language_model_client(config: &Config) -> SharedLanguageModelClient {
    match config.llm_provider {
        LlmProvider::Ollama => Arc::new(OllamaCompletionClient::new(
            config.ollama_url.clone(),
            config.llm_model.clone(),
            config.llm_temperature,
        )),
        LlmProvider::OpenAI => Arc::new(OpenAiCompletionClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone().unwrap_or_default(),
            config.llm_model.clone(),
            config.llm_temperature,
        )),
    }
}
