//! Shared types used by the vector index and its callers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No persisted index exists at the location; callers start empty.
    #[error("No persisted index found at {0}")]
    NotFound(PathBuf),
    /// Filesystem access failed.
    #[error("Index I/O failed at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Index contents could not be encoded or decoded.
    #[error("Index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Vector width differs from the width already stored in the index.
    #[error("Vector dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of vectors already in the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Chunks and embeddings were not paired one to one.
    #[error("Got {chunks} chunks but {vectors} vectors")]
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// Persisted file decoded but violates index invariants.
    #[error("Persisted index is corrupt: {0}")]
    Corrupt(String),
}

/// A contiguous span of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier of the document the chunk was cut from.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub ordinal: usize,
    /// Byte offset of the chunk's first character in the document text.
    #[serde(default)]
    pub offset: usize,
    /// Chunk text.
    pub text: String,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
}

impl Chunk {
    /// Build a chunk, hashing its text.
    pub fn new(
        source: impl Into<String>,
        ordinal: usize,
        offset: usize,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            source: source.into(),
            ordinal,
            offset,
            chunk_hash: compute_chunk_hash(&text),
            text,
        }
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// A chunk committed to the index together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Identifier assigned when the chunk was added.
    pub id: String,
    /// Chunk contents and provenance.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Embedding vector attached to the chunk.
    pub vector: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Identifier of the indexed chunk.
    pub id: String,
    /// Cosine similarity between the query and the chunk.
    pub score: f32,
    /// Matched chunk.
    pub chunk: Chunk,
}
