use super::{LanguageModelClient, LanguageModelError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Completion client backed by a local Ollama runtime (`POST /api/generate`).
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaCompletionClient {
    /// Construct a client for the runtime at `base_url`.
    pub fn new(base_url: String, model: String, temperature: Option<f32>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            model,
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl LanguageModelClient for OllamaCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let mut options = Map::new();
        if let Some(temperature) = self.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": Value::Object(options),
        });

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting Ollama completion");
        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LanguageModelError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(LanguageModelError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn ollama_client_returns_response_unmodified() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient::new(server.base_url(), "deepseek-r1".into(), None);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model":"deepseek-r1","stream":false}"#);
                then.status(200).json_body(json!({
                    "response": "<think>hm</think>\nParis.\n",
                    "done": true
                }));
            })
            .await;

        let answer = client.complete("prompt").await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "<think>hm</think>\nParis.\n");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient::new(server.base_url(), "llama".into(), Some(0.1));

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = client.complete("prompt").await.expect_err("error response");
        assert!(
            matches!(error, LanguageModelError::GenerationFailed(message) if message.contains("500"))
        );
    }

    #[tokio::test]
    async fn ollama_client_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        let client = OllamaCompletionClient::new(server.base_url(), "llama".into(), None);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "Par", "done": false }));
            })
            .await;

        let error = client.complete("prompt").await.expect_err("incomplete");
        assert!(matches!(error, LanguageModelError::InvalidResponse(_)));
    }
}
