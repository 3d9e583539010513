use super::{LanguageModelClient, LanguageModelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Completion client for OpenAI-compatible `POST /chat/completions` endpoints.
pub struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompletionClient {
    /// Construct a client for the API at `base_url`.
    pub fn new(base_url: String, api_key: String, model: String, temperature: Option<f32>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
            model,
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModelClient for OpenAiCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let mut payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(temperature) = self.temperature {
            payload["temperature"] = json!(temperature);
        }

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting chat completion");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LanguageModelError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanguageModelError::GenerationFailed(format!(
                "chat endpoint returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            LanguageModelError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LanguageModelError::InvalidResponse("response had no choices".into()))
    }
}
