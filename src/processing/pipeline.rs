//! Ingestion pipeline: document → chunks → embeddings → index → disk.

use crate::{
    config::Config,
    embedding::{SharedEmbeddingClient, embed_checked, get_embedding_client},
    index::{Chunk, VectorIndex},
    processing::{
        chunking::ChunkingPolicy,
        document::Document,
        types::{DocumentError, IngestionError, IngestionOutcome, IngestionReport},
    },
    progress::{ProgressEvent, ProgressReporter},
};
use std::time::Instant;

/// Turns documents into indexed, persisted chunks.
///
/// A document is committed only after every chunk has been embedded and the index has been
/// written to disk. Failures leave the index exactly as it was.
pub struct IngestionPipeline {
    embedding_client: SharedEmbeddingClient,
    policy: ChunkingPolicy,
    batch_size: usize,
}

impl IngestionPipeline {
    /// Assemble a pipeline from explicit parts. `batch_size` is the number of chunks per
    /// embedding request and is at least one.
    pub fn new(
        embedding_client: SharedEmbeddingClient,
        policy: ChunkingPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            embedding_client,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    /// Build the pipeline described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let policy = ChunkingPolicy::from_config(config);
        tracing::debug!(
            chunk_size = policy.chunk_size,
            override = config.text_splitter_chunk_size,
            provider = ?policy.provider,
            model = %policy.model,
            overlap = policy.overlap,
            use_safe_defaults = config.text_splitter_use_safe_defaults,
            "Derived chunking policy"
        );
        Self::new(
            get_embedding_client(config),
            policy,
            config.embedding_batch_size,
        )
    }

    /// Embedding client shared with the answer engine.
    pub fn embedding_client(&self) -> &SharedEmbeddingClient {
        &self.embedding_client
    }

    /// Active chunking policy.
    pub fn policy(&self) -> &ChunkingPolicy {
        &self.policy
    }

    /// Ingest a single document into `index` and persist it.
    pub async fn ingest(
        &self,
        index: &mut VectorIndex,
        document: Document,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestionReport, IngestionError> {
        let started = Instant::now();
        let Document { id, content } = document;
        if content.trim().is_empty() {
            return Err(DocumentError::Empty(id).into());
        }

        let chunks: Vec<Chunk> = self
            .policy
            .split(&content)?
            .into_iter()
            .filter(|span| !span.text.trim().is_empty())
            .enumerate()
            .map(|(ordinal, span)| Chunk::new(id.as_str(), ordinal, span.offset, span.text))
            .collect();
        if chunks.is_empty() {
            return Err(DocumentError::Empty(id).into());
        }

        let total = chunks.len();
        let mut embeddings = Vec::with_capacity(total);
        for batch in chunks.chunks(self.batch_size) {
            let texts = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embed_checked(self.embedding_client.as_ref(), texts).await?;
            embeddings.extend(vectors);
            progress.report(ProgressEvent::ChunksEmbedded {
                source: id.clone(),
                embedded: embeddings.len(),
                total,
            });
        }

        let previous_len = index.len();
        index.add(chunks, embeddings)?;
        if let Err(error) = index.persist() {
            index.truncate(previous_len);
            return Err(error.into());
        }

        let elapsed = started.elapsed();
        tracing::info!(
            source = %id,
            chunks = total,
            chunk_size = self.policy.chunk_size,
            elapsed_ms = elapsed.as_millis() as u64,
            index_size = index.len(),
            "Document ingested"
        );
        Ok(IngestionReport {
            source: id,
            chunk_count: total,
            chunk_size: self.policy.chunk_size,
            elapsed,
        })
    }

    /// Ingest an upload batch. Each entry succeeds or fails on its own; a failure never stops
    /// the remaining documents.
    pub async fn ingest_batch(
        &self,
        index: &mut VectorIndex,
        documents: Vec<Result<Document, DocumentError>>,
        progress: &dyn ProgressReporter,
    ) -> Vec<IngestionOutcome> {
        let total = documents.len();
        let mut outcomes = Vec::with_capacity(total);

        for (position, document) in documents.into_iter().enumerate() {
            let source = match &document {
                Ok(document) => document.id.clone(),
                Err(error) => error.source_id(),
            };
            progress.report(ProgressEvent::DocumentStarted {
                source: source.clone(),
                position: position + 1,
                total,
            });

            let started = Instant::now();
            let result = match document {
                Ok(document) => self.ingest(index, document, progress).await,
                Err(error) => Err(error.into()),
            };
            if let Err(error) = &result {
                tracing::warn!(source = %source, error = %error, "Document ingestion failed");
            }

            let outcome = IngestionOutcome {
                source: source.clone(),
                elapsed: started.elapsed(),
                result,
            };
            progress.report(ProgressEvent::DocumentFinished {
                source,
                outcome: outcome.message(),
            });
            outcomes.push(outcome);
        }

        outcomes
    }
}
