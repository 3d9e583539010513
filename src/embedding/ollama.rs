use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Embedding client backed by a local Ollama runtime (`POST /api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingClient {
    /// Construct a client for the runtime at `base_url`.
    pub fn new(base_url: String, model: String, dimension: usize) -> Self {
        Self {
            http: Client::new(),
            base_url,
            model,
            dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(model = %self.model, count = texts.len(), "Requesting Ollama embeddings");
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        Ok(body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_client_returns_vectors_in_order() {
        let server = MockServer::start_async().await;
        let client = OllamaEmbeddingClient::new(server.base_url(), "mxbai-embed-large".into(), 2);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body_partial(r#"{"model":"mxbai-embed-large"}"#);
                then.status(200).json_body(json!({
                    "model": "mxbai-embed-large",
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let vectors = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("vectors");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn ollama_client_maps_missing_model_to_unavailable() {
        let server = MockServer::start_async().await;
        let client = OllamaEmbeddingClient::new(server.base_url(), "missing".into(), 2);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(404).body("model not found");
            })
            .await;

        let error = client
            .generate_embeddings(vec!["x".into()])
            .await
            .expect_err("404");
        assert!(
            matches!(error, EmbeddingClientError::ProviderUnavailable(message) if message.contains("model not found"))
        );
    }

    #[tokio::test]
    async fn ollama_client_skips_request_for_empty_input() {
        let client = OllamaEmbeddingClient::new("http://127.0.0.1:9".into(), "m".into(), 2);
        let vectors = client.generate_embeddings(Vec::new()).await.unwrap();
        assert!(vectors.is_empty());
    }
}
