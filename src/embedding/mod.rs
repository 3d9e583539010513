//! Embedding service adapters.
//!
//! The pipeline and the answer engine only see [`EmbeddingClient`]; the concrete backend is
//! chosen from configuration by [`get_embedding_client`].

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Returned vector width does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the index.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Width of the vectors this client produces.
    fn dimension(&self) -> usize;
}

/// Shared handle to an embedding backend.
pub type SharedEmbeddingClient = Arc<dyn EmbeddingClient>;

/// Embed a batch and verify the provider returned one correctly sized vector per input.
pub async fn embed_checked(
    client: &dyn EmbeddingClient,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    let expected_count = texts.len();
    let vectors = client.generate_embeddings(texts).await?;
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected_count} vectors, got {}",
            vectors.len()
        )));
    }
    let expected = client.dimension();
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
        return Err(EmbeddingClientError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(config: &Config) -> SharedEmbeddingClient {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone().unwrap_or_default(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::Hashing => {
            Arc::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    }
}
