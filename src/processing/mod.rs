//! Ingestion pipeline: document loading, chunking, embedding, and index commits.

pub mod chunking;
pub mod document;
mod pipeline;
pub mod types;

pub use chunking::{ChunkingPolicy, TextSpan};
pub use document::Document;
pub use pipeline::IngestionPipeline;
pub use types::{
    ChunkingError, DocumentError, IngestionError, IngestionOutcome, IngestionReport,
};
