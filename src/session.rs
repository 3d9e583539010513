//! Session orchestrator: the active index, retrieval settings, and conversation history.

use crate::{
    answer::{Answer, AnswerEngine, QueryError, RetrievalSettings},
    batch::{self, BatchError, BatchMode, BatchReport, BatchRequest, FileOutcome},
    config::Config,
    index::{IndexError, VectorIndex},
    llm::get_language_model_client,
    metrics::{MetricsSnapshot, SessionMetrics},
    processing::{Document, DocumentError, IngestionOutcome, IngestionPipeline},
    progress::ProgressReporter,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shown when a question arrives before any document has been ingested.
pub const NO_INDEX_NOTICE: &str = "Vector store not found. Please upload a document.";

const LOADED_NOTICE: &str = "Loaded persisted vector store.";
const COLD_START_NOTICE: &str = "No vector store found at the specified path.";
const UNREADABLE_INDEX_NOTICE: &str =
    "The saved vector store could not be read. Upload a document to replace it, or reset.";

/// Errors that stop a session operation as a whole.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The persisted index exists but could not be loaded or removed.
    #[error("Vector index error: {0}")]
    Index(#[from] IndexError),
}

/// Whether an index is available to answer questions.
#[derive(Debug)]
pub enum IndexState {
    /// Nothing ingested or loaded yet; questions fail with [`QueryError::NoIndex`].
    Uninitialized,
    /// An index is bound and searchable.
    Ready(VectorIndex),
}

impl IndexState {
    /// The bound index, if any.
    pub fn index(&self) -> Option<&VectorIndex> {
        match self {
            Self::Uninitialized => None,
            Self::Ready(index) => Some(index),
        }
    }
}

/// Snapshot of the index binding for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No index bound.
    Uninitialized,
    /// An index is bound.
    Ready {
        /// Indexed chunk count.
        chunks: usize,
        /// Distinct source documents.
        sources: BTreeSet<String>,
        /// Persistence directory.
        location: PathBuf,
    },
}

/// One line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// True for user turns, false for assistant replies and notices.
    pub is_user: bool,
}

impl ChatMessage {
    fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: true,
        }
    }

    fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
        }
    }
}

/// The single active session.
///
/// Questions are only answered once a document has been ingested or a persisted index was
/// loaded at startup. Failures are converted into history entries or returned values; none of
/// them end the session.
pub struct Session {
    pipeline: IngestionPipeline,
    engine: AnswerEngine,
    state: IndexState,
    index_dir: PathBuf,
    settings: RetrievalSettings,
    history: Vec<ChatMessage>,
    pending_input: String,
    metrics: SessionMetrics,
}

impl Session {
    /// Open a session, resuming from a persisted index in `index_dir` when one exists.
    ///
    /// A persisted index that cannot be read leaves the session uninitialized with a notice;
    /// the next successful upload or [`Session::clear_all`] replaces the file.
    pub fn open(
        pipeline: IngestionPipeline,
        engine: AnswerEngine,
        index_dir: impl Into<PathBuf>,
        settings: RetrievalSettings,
    ) -> Self {
        let index_dir = index_dir.into();
        let (state, notice) = match VectorIndex::load(&index_dir) {
            Ok(index) => (IndexState::Ready(index), LOADED_NOTICE),
            Err(IndexError::NotFound(_)) => {
                tracing::info!(location = %index_dir.display(), "No persisted index; cold start");
                (IndexState::Uninitialized, COLD_START_NOTICE)
            }
            Err(error) => {
                tracing::error!(
                    location = %index_dir.display(),
                    error = %error,
                    "Persisted index unreadable; starting without an index"
                );
                (IndexState::Uninitialized, UNREADABLE_INDEX_NOTICE)
            }
        };

        Self {
            pipeline,
            engine,
            state,
            index_dir,
            settings,
            history: vec![ChatMessage::assistant(notice)],
            pending_input: String::new(),
            metrics: SessionMetrics::new(),
        }
    }

    /// Open the session described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let pipeline = IngestionPipeline::from_config(config);
        let engine = AnswerEngine::new(
            pipeline.embedding_client().clone(),
            get_language_model_client(config),
        );
        let settings = RetrievalSettings::new(
            config.retrieval_default_k,
            config.retrieval_default_score_threshold,
        )
        .unwrap_or_default();
        Self::open(pipeline, engine, config.index_dir.clone(), settings)
    }

    /// Current index binding.
    pub fn state(&self) -> &IndexState {
        &self.state
    }

    /// Whether questions can be answered.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, IndexState::Ready(_))
    }

    /// Directory the index persists to.
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Conversation so far, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Text typed but not yet submitted.
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    /// Replace the pending input.
    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending_input = text.into();
    }

    /// Retrieval settings applied to the next question.
    pub fn settings(&self) -> RetrievalSettings {
        self.settings
    }

    /// Change the retrieval settings for subsequent questions.
    pub fn update_settings(&mut self, settings: RetrievalSettings) {
        tracing::debug!(
            k = settings.k,
            score_threshold = settings.score_threshold,
            "Retrieval settings updated"
        );
        self.settings = settings;
    }

    /// Ingest one document. See [`Session::ingest_many`].
    pub async fn ingest(
        &mut self,
        document: Document,
        progress: &dyn ProgressReporter,
    ) -> Vec<IngestionOutcome> {
        self.ingest_many(vec![Ok(document)], progress).await
    }

    /// Read and ingest files from disk. Unreadable files fail individually.
    pub async fn ingest_paths(
        &mut self,
        paths: &[PathBuf],
        progress: &dyn ProgressReporter,
    ) -> Vec<IngestionOutcome> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(Document::from_path(path).await);
        }
        self.ingest_many(documents, progress).await
    }

    /// Ingest an upload.
    ///
    /// A new upload invalidates the conversation: history and pending input are cleared first,
    /// then one notice per document is appended.
    pub async fn ingest_many(
        &mut self,
        documents: Vec<Result<Document, DocumentError>>,
        progress: &dyn ProgressReporter,
    ) -> Vec<IngestionOutcome> {
        self.history.clear();
        self.pending_input.clear();

        let was_ready = self.is_ready();
        let mut index = self.take_index();
        let outcomes = self
            .pipeline
            .ingest_batch(&mut index, documents, progress)
            .await;
        self.restore_index(index, was_ready);

        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) => self.metrics.record_document(report.chunk_count as u64),
                Err(_) => self.metrics.record_ingestion_failure(),
            }
            self.history.push(ChatMessage::assistant(outcome.message()));
        }
        outcomes
    }

    /// Answer `question` with explicit retrieval settings and record the exchange.
    ///
    /// A blank question is rejected without touching history. Asking before any index exists
    /// appends [`NO_INDEX_NOTICE`] instead of the exchange. Other failures are recorded as the
    /// reply so they stay visible in the conversation.
    pub async fn ask(
        &mut self,
        question: &str,
        settings: RetrievalSettings,
    ) -> Result<Answer, QueryError> {
        let question = question.trim();
        let result = self
            .engine
            .ask(self.state.index(), question, settings)
            .await;
        self.pending_input.clear();

        match &result {
            Ok(answer) => {
                self.metrics.record_answer(answer.grounded);
                self.history.push(ChatMessage::user(question));
                self.history.push(ChatMessage::assistant(answer.text.as_str()));
            }
            Err(QueryError::Validation(_)) => {}
            Err(QueryError::NoIndex) => {
                self.history.push(ChatMessage::assistant(NO_INDEX_NOTICE));
            }
            Err(error) => {
                tracing::warn!(error = %error, "Question failed");
                self.history.push(ChatMessage::user(question));
                self.history.push(ChatMessage::assistant(error.to_string()));
            }
        }
        result
    }

    /// Ask with the session's current settings.
    pub async fn ask_with_current_settings(
        &mut self,
        question: &str,
    ) -> Result<Answer, QueryError> {
        let settings = self.settings;
        self.ask(question, settings).await
    }

    /// Empty the conversation; the index is kept.
    pub fn clear_chat(&mut self) {
        self.history.clear();
        self.pending_input.clear();
    }

    /// Discard the index (memory and disk) and the conversation.
    ///
    /// The conversation is cleared and the session left uninitialized even when removing the
    /// file fails; the error is still returned so the caller can report it.
    pub fn clear_all(&mut self) -> Result<(), SessionError> {
        let mut index = self.take_index();
        self.clear_chat();
        index.reset()?;
        tracing::info!(location = %self.index_dir.display(), "Session reset");
        Ok(())
    }

    /// Describe the current index binding.
    pub fn status(&self) -> SessionStatus {
        match &self.state {
            IndexState::Uninitialized => SessionStatus::Uninitialized,
            IndexState::Ready(index) => SessionStatus::Ready {
                chunks: index.len(),
                sources: index.sources(),
                location: index.location().to_path_buf(),
            },
        }
    }

    /// Run a batch over `request.dir`.
    ///
    /// Asking in batch before any index exists appends [`NO_INDEX_NOTICE`] once; each file is
    /// then reported as failed and no model call is made.
    pub async fn run_batch(
        &mut self,
        request: &BatchRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport, BatchError> {
        let report = match request.mode {
            BatchMode::Ask => {
                if !self.is_ready() {
                    self.history.push(ChatMessage::assistant(NO_INDEX_NOTICE));
                }
                batch::run_ask(
                    &self.engine,
                    self.state.index(),
                    self.settings,
                    request,
                    progress,
                )
                .await?
            }
            BatchMode::Ingest => {
                let was_ready = self.is_ready();
                let mut index = self.take_index();
                let result =
                    batch::run_ingest(&self.pipeline, &mut index, request, progress).await;
                self.restore_index(index, was_ready);
                let report = result?;
                for outcome in &report.outcomes {
                    match outcome {
                        FileOutcome::Ingested { chunks, .. } => {
                            self.metrics.record_document(*chunks as u64)
                        }
                        FileOutcome::Failed { .. } => self.metrics.record_ingestion_failure(),
                        _ => {}
                    }
                }
                report
            }
        };

        self.metrics.record_batch(
            report.written() as u64,
            report.skipped() as u64,
            report.failed() as u64,
        );
        Ok(report)
    }

    /// Current activity counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn take_index(&mut self) -> VectorIndex {
        match std::mem::replace(&mut self.state, IndexState::Uninitialized) {
            IndexState::Ready(index) => index,
            IndexState::Uninitialized => VectorIndex::create(&self.index_dir),
        }
    }

    fn restore_index(&mut self, index: VectorIndex, was_ready: bool) {
        if was_ready || !index.is_empty() {
            self.state = IndexState::Ready(index);
        }
    }
}
