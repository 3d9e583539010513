//! Core data types and error definitions for the ingestion pipeline.

use crate::{embedding::EmbeddingClientError, index::IndexError};
use anyhow::Error as TokenizerError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors raised while reading an uploaded document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The content could not be decoded into text.
    #[error("{id} is not readable as text: {reason}")]
    Unreadable {
        /// Document identifier.
        id: String,
        /// Why decoding failed.
        reason: String,
    },
    /// The document contains no text.
    #[error("{0} contains no text")]
    Empty(String),
}

impl DocumentError {
    /// Identifier of the document the error refers to.
    pub fn source_id(&self) -> String {
        match self {
            Self::Io { path, .. } => path.display().to_string(),
            Self::Unreadable { id, .. } | Self::Empty(id) => id.clone(),
        }
    }
}

/// Errors emitted by the ingestion pipeline for a single document.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The document could not be read or was empty.
    #[error("Invalid document: {0}")]
    Document(#[from] DocumentError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The index rejected the chunks or could not be persisted.
    #[error("Failed to commit to index: {0}")]
    Index(#[from] IndexError),
}

/// Summary of a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionReport {
    /// Identifier of the ingested document.
    pub source: String,
    /// Number of chunks committed.
    pub chunk_count: usize,
    /// Token budget used while chunking.
    pub chunk_size: usize,
    /// Wall-clock time spent on the document.
    pub elapsed: Duration,
}

/// Per-document result of an upload batch.
#[derive(Debug)]
pub struct IngestionOutcome {
    /// Identifier of the document.
    pub source: String,
    /// Wall-clock time spent on the document, including failures.
    pub elapsed: Duration,
    /// What happened.
    pub result: Result<IngestionReport, IngestionError>,
}

impl IngestionOutcome {
    /// Whether the document was committed to the index.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// User-facing status line.
    pub fn message(&self) -> String {
        match &self.result {
            Ok(report) => format!(
                "Ingested {} in {:.2} seconds ({} chunks)",
                report.source,
                report.elapsed.as_secs_f64(),
                report.chunk_count
            ),
            Err(error) => format!("Error during ingestion of {}: {error}", self.source),
        }
    }
}
