//! Vector index adapter: add, similarity search with a score floor, persistence, reset.

mod persist;
pub mod store;
pub mod types;

pub use store::{VectorIndex, cosine_similarity};
pub use types::{Chunk, IndexError, IndexedChunk, ScoredChunk, compute_chunk_hash};
