//! In-memory vector index with explicit persistence.

use super::persist;
use super::types::{Chunk, IndexError, IndexedChunk, ScoredChunk};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable collection of embedded chunks searchable by cosine similarity.
///
/// Mutations only touch memory; nothing is durable until [`VectorIndex::persist`] returns.
#[derive(Debug)]
pub struct VectorIndex {
    location: PathBuf,
    dimension: Option<usize>,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Create an empty index that will persist to `location`.
    pub fn create(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            dimension: None,
            entries: Vec::new(),
        }
    }

    /// Reconstruct an index from `location`.
    ///
    /// Returns [`IndexError::NotFound`] when nothing has been persisted there yet.
    pub fn load(location: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let location = location.into();
        let file = persist::read_index(&location)?;
        tracing::info!(
            location = %location.display(),
            chunks = file.entries.len(),
            dimension = ?file.dimension,
            "Loaded persisted index"
        );
        Ok(Self {
            location,
            dimension: file.dimension,
            entries: file.entries,
        })
    }

    /// Directory the index persists to.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector width fixed by the first added chunk, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Distinct source identifiers represented in the index.
    pub fn sources(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .map(|entry| entry.chunk.source.clone())
            .collect()
    }

    /// Append chunk/vector pairs.
    ///
    /// Either every pair is added or none is. Re-adding identical content creates duplicate
    /// entries.
    pub fn add(&mut self, chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<usize, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: embeddings.len(),
            });
        }
        let Some(first) = embeddings.first() else {
            return Ok(0);
        };

        let expected = self.dimension.unwrap_or(first.len());
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let added = chunks.len();
        self.dimension = Some(expected);
        self.entries.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, vector)| IndexedChunk {
                    id: Uuid::new_v4().to_string(),
                    chunk,
                    vector,
                }),
        );
        tracing::debug!(added, total = self.entries.len(), "Chunks added to index");
        Ok(added)
    }

    /// Return up to `k` chunks scoring at least `score_threshold`, best first.
    ///
    /// Ties keep insertion order. An empty result is not an error.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.vector), entry))
            .filter(|(score, _)| *score >= score_threshold)
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| ScoredChunk {
                id: entry.id.clone(),
                score,
                chunk: entry.chunk.clone(),
            })
            .collect())
    }

    /// Flush the current state to disk.
    pub fn persist(&self) -> Result<(), IndexError> {
        persist::write_index(&self.location, self.dimension, &self.entries)?;
        tracing::debug!(
            location = %self.location.display(),
            chunks = self.entries.len(),
            "Index persisted"
        );
        Ok(())
    }

    /// Discard every chunk in memory and on disk.
    pub fn reset(&mut self) -> Result<(), IndexError> {
        self.entries.clear();
        self.dimension = None;
        persist::remove_index(&self.location)?;
        tracing::info!(location = %self.location.display(), "Index reset");
        Ok(())
    }

    /// Drop entries added after the first `len`, undoing an uncommitted append.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        if self.entries.is_empty() {
            self.dimension = None;
        }
    }
}

/// Cosine similarity; zero-norm or mismatched vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(text: &str, ordinal: usize) -> Chunk {
        Chunk::new("doc.txt", ordinal, 0, text)
    }

    fn sample_index(dir: &Path) -> VectorIndex {
        let mut index = VectorIndex::create(dir);
        index
            .add(
                vec![chunk("east", 0), chunk("north", 1), chunk("north-east", 2)],
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
            )
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_score_and_respects_k() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());

        let hits = index.search(&[1.0, 0.1], 2, 0.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "east");
        assert_eq!(hits[1].chunk.text, "north-east");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_never_returns_scores_below_threshold() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());

        let hits = index.search(&[1.0, 0.0], 10, 0.5).unwrap();
        assert!(hits.iter().all(|hit| hit.score >= 0.5));
        assert_eq!(hits.len(), 2);

        let none = index.search(&[-1.0, -1.0], 10, 0.2).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn search_breaks_ties_by_insertion_order() {
        let dir = tempdir().unwrap();
        let mut index = VectorIndex::create(dir.path());
        index
            .add(
                vec![chunk("first", 0), chunk("second", 1)],
                vec![vec![1.0, 0.0], vec![2.0, 0.0]],
            )
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 2, 0.0).unwrap();
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[test]
    fn search_on_empty_index_is_empty() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::create(dir.path());
        assert!(index.search(&[1.0, 0.0], 5, 0.0).unwrap().is_empty());
    }

    #[test]
    fn add_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let mut index = sample_index(dir.path());

        let error = index
            .add(
                vec![chunk("ok", 3), chunk("bad", 4)],
                vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
            )
            .unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.len(), 3);

        let error = index.add(vec![chunk("lonely", 5)], Vec::new()).unwrap_err();
        assert!(matches!(error, IndexError::LengthMismatch { chunks: 1, vectors: 0 }));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn duplicate_content_is_not_deduplicated() {
        let dir = tempdir().unwrap();
        let mut index = VectorIndex::create(dir.path());
        for _ in 0..2 {
            index.add(vec![chunk("same", 0)], vec![vec![1.0]]).unwrap();
        }
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let index = sample_index(dir.path());
        index.persist().unwrap();

        let reloaded = VectorIndex::load(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.dimension(), Some(2));
        assert_eq!(
            reloaded.search(&[0.2, 1.0], 3, 0.0).unwrap(),
            index.search(&[0.2, 1.0], 3, 0.0).unwrap()
        );
    }

    #[test]
    fn load_without_persisted_state_is_not_found() {
        let dir = tempdir().unwrap();
        let error = VectorIndex::load(dir.path().join("missing")).unwrap_err();
        assert!(matches!(error, IndexError::NotFound(_)));
    }

    #[test]
    fn load_rejects_corrupt_vectors() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.json"),
            r#"{"version":1,"dimension":3,"entries":[{"id":"x","source":"s","ordinal":0,"text":"t","chunk_hash":"h","vector":[1.0]}]}"#,
        )
        .unwrap();
        let error = VectorIndex::load(dir.path()).unwrap_err();
        assert!(matches!(error, IndexError::Corrupt(_)));
    }

    #[test]
    fn reset_clears_memory_and_disk() {
        let dir = tempdir().unwrap();
        let mut index = sample_index(dir.path());
        index.persist().unwrap();

        index.reset().unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn truncate_rolls_back_uncommitted_append() {
        let dir = tempdir().unwrap();
        let mut index = VectorIndex::create(dir.path());
        index.add(vec![chunk("a", 0)], vec![vec![1.0, 0.0]]).unwrap();
        index.truncate(0);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
