//! Query/answer engine: retrieve passages above a score floor and ground the model on them.

use crate::{
    embedding::{EmbeddingClientError, SharedEmbeddingClient, embed_checked},
    index::{IndexError, ScoredChunk, VectorIndex},
    llm::{LanguageModelError, SharedLanguageModelClient},
};
use thiserror::Error;

/// Reply given when no passage clears the score threshold.
pub const INSUFFICIENT_CONTEXT: &str =
    "No relevant context found in the document to answer your question.";

/// Largest `k` a caller may request.
pub const MAX_K: usize = 10;

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No index has been ingested or loaded.
    #[error("No document has been ingested yet")]
    NoIndex,
    /// The request was rejected before any service call.
    #[error("Invalid request: {0}")]
    Validation(String),
    /// The question could not be embedded.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The index rejected the query vector.
    #[error("Failed to search index: {0}")]
    Index(#[from] IndexError),
    /// The language model call failed.
    #[error("Failed to generate answer: {0}")]
    LanguageModel(#[from] LanguageModelError),
}

/// Per-call retrieval controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    /// Maximum passages retrieved, in `1..=10`.
    pub k: usize,
    /// Minimum similarity a passage must reach, in `[0, 1]`.
    pub score_threshold: f32,
}

impl RetrievalSettings {
    /// Validate and build settings.
    pub fn new(k: usize, score_threshold: f32) -> Result<Self, QueryError> {
        if !(1..=MAX_K).contains(&k) {
            return Err(QueryError::Validation(format!(
                "k must be between 1 and {MAX_K}, got {k}"
            )));
        }
        if !score_threshold.is_finite() || !(0.0..=1.0).contains(&score_threshold) {
            return Err(QueryError::Validation(format!(
                "score threshold must be between 0 and 1, got {score_threshold}"
            )));
        }
        Ok(Self { k, score_threshold })
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: 5,
            score_threshold: 0.2,
        }
    }
}

/// A reply together with the passages that grounded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Text shown to the user, exactly as the model returned it.
    pub text: String,
    /// False when nothing was retrieved and [`INSUFFICIENT_CONTEXT`] was returned.
    pub grounded: bool,
    /// Retrieved passages, best first.
    pub passages: Vec<ScoredChunk>,
}

impl Answer {
    fn insufficient_context() -> Self {
        Self {
            text: INSUFFICIENT_CONTEXT.to_string(),
            grounded: false,
            passages: Vec::new(),
        }
    }
}

/// Assemble the grounded prompt: instructions, passages verbatim, then the question.
pub fn build_prompt(passages: &[ScoredChunk], question: &str) -> String {
    let context = passages
        .iter()
        .map(|passage| passage.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are a helpful assistant answering questions based on the uploaded document. \
         Use only the following pieces of retrieved context to answer the question. \
         If you don't know the answer, say that you don't know. \
         Answer concisely and accurately in three sentences or less.\n\n\
         Context:\n{context}\n\n\
         Question:\n{question}\n\n\
         Answer:"
    )
}

/// Retrieval-augmented question answering over a [`VectorIndex`].
///
/// The engine keeps no retrieval defaults; `k` and the threshold arrive with every call.
pub struct AnswerEngine {
    embedding_client: SharedEmbeddingClient,
    language_model: SharedLanguageModelClient,
}

impl AnswerEngine {
    /// Bind an engine to its embedding and completion services.
    pub fn new(
        embedding_client: SharedEmbeddingClient,
        language_model: SharedLanguageModelClient,
    ) -> Self {
        Self {
            embedding_client,
            language_model,
        }
    }

    /// Answer `question` from `index`.
    ///
    /// The language model is only called when at least one passage clears the threshold.
    pub async fn ask(
        &self,
        index: Option<&VectorIndex>,
        question: &str,
        settings: RetrievalSettings,
    ) -> Result<Answer, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::Validation("question is empty".into()));
        }
        let index = index.ok_or(QueryError::NoIndex)?;

        let mut vectors =
            embed_checked(self.embedding_client.as_ref(), vec![question.to_string()]).await?;
        let query = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no vector returned for question".into())
        })?;

        let passages = index.search(&query, settings.k, settings.score_threshold)?;
        tracing::debug!(
            k = settings.k,
            score_threshold = settings.score_threshold,
            retrieved = passages.len(),
            top_score = passages.first().map(|passage| passage.score),
            "Retrieved passages"
        );
        if passages.is_empty() {
            tracing::info!("No passage cleared the score threshold; skipping model call");
            return Ok(Answer::insufficient_context());
        }

        let prompt = build_prompt(&passages, question);
        let text = self.language_model.complete(&prompt).await?;
        tracing::info!(
            passages = passages.len(),
            answer_chars = text.chars().count(),
            "Answer generated"
        );
        Ok(Answer {
            text,
            grounded: true,
            passages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::index::Chunk;
    use crate::llm::LanguageModelClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    const DIMENSION: usize = 1024;

    #[derive(Default)]
    struct RecordingModel {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModelClient for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("<think>hmm</think>Paris.".into())
        }
    }

    async fn france_index(dir: &std::path::Path) -> VectorIndex {
        let embedder = HashingEmbeddingClient::new(DIMENSION);
        let texts = vec![
            "The capital of France is Paris.".to_string(),
            "Bananas are rich in potassium.".to_string(),
        ];
        let vectors = embed_checked(&embedder, texts.clone()).await.unwrap();
        let mut index = VectorIndex::create(dir);
        let chunks = texts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk::new("facts.txt", ordinal, 0, text))
            .collect();
        index.add(chunks, vectors).unwrap();
        index
    }

    fn engine(model: Arc<RecordingModel>) -> AnswerEngine {
        AnswerEngine::new(Arc::new(HashingEmbeddingClient::new(DIMENSION)), model)
    }

    #[test]
    fn settings_validate_ranges() {
        assert!(RetrievalSettings::new(1, 0.0).is_ok());
        assert!(RetrievalSettings::new(10, 1.0).is_ok());
        assert!(matches!(
            RetrievalSettings::new(0, 0.2),
            Err(QueryError::Validation(_))
        ));
        assert!(matches!(
            RetrievalSettings::new(11, 0.2),
            Err(QueryError::Validation(_))
        ));
        assert!(RetrievalSettings::new(5, 1.5).is_err());
        assert!(RetrievalSettings::new(5, f32::NAN).is_err());
        assert_eq!(
            RetrievalSettings::default(),
            RetrievalSettings::new(5, 0.2).unwrap()
        );
    }

    #[test]
    fn prompt_contains_passages_verbatim_and_question() {
        let passages = vec![
            ScoredChunk {
                id: "a".into(),
                score: 0.9,
                chunk: Chunk::new("doc", 0, 0, "First passage."),
            },
            ScoredChunk {
                id: "b".into(),
                score: 0.5,
                chunk: Chunk::new("doc", 1, 15, "Second passage."),
            },
        ];
        let prompt = build_prompt(&passages, "What comes first?");
        assert!(prompt.contains("Context:\nFirst passage.\n\nSecond passage.\n\n"));
        assert!(prompt.contains("Question:\nWhat comes first?"));
        assert!(prompt.contains("three sentences or less"));
    }

    #[tokio::test]
    async fn answers_from_retrieved_context() {
        let dir = tempdir().unwrap();
        let index = france_index(dir.path()).await;
        let model = Arc::new(RecordingModel::default());

        let answer = engine(model.clone())
            .ask(
                Some(&index),
                "What is the capital of France?",
                RetrievalSettings::default(),
            )
            .await
            .unwrap();

        assert!(answer.grounded);
        assert_eq!(answer.text, "<think>hmm</think>Paris.");
        assert_eq!(answer.passages[0].chunk.text, "The capital of France is Paris.");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("The capital of France is Paris."));
        assert!(!prompts[0].contains("Bananas"));
    }

    #[tokio::test]
    async fn missing_index_never_calls_model() {
        let model = Arc::new(RecordingModel::default());
        let error = engine(model.clone())
            .ask(None, "Anything?", RetrievalSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::NoIndex));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_retrieval_returns_fixed_reply_without_model_call() {
        let dir = tempdir().unwrap();
        let index = france_index(dir.path()).await;
        let model = Arc::new(RecordingModel::default());

        let answer = engine(model.clone())
            .ask(
                Some(&index),
                "Quantum chromodynamics lattice gauge",
                RetrievalSettings::new(5, 0.9).unwrap(),
            )
            .await
            .unwrap();

        assert!(!answer.grounded);
        assert_eq!(answer.text, INSUFFICIENT_CONTEXT);
        assert!(answer.passages.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_question_is_rejected_before_any_call() {
        let model = Arc::new(RecordingModel::default());
        let error = engine(model.clone())
            .ask(None, "   ", RetrievalSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::Validation(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
