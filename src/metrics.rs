use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing session activity.
#[derive(Default)]
pub struct SessionMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    ingestion_failures: AtomicU64,
    questions_answered: AtomicU64,
    insufficient_context: AtomicU64,
    batch_files_written: AtomicU64,
    batch_files_skipped: AtomicU64,
    batch_files_failed: AtomicU64,
}

impl SessionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks it contributed.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document that failed to ingest.
    pub fn record_ingestion_failure(&self) {
        self.ingestion_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered question; `grounded` is false for the insufficient-context reply.
    pub fn record_answer(&self, grounded: bool) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        if !grounded {
            self.insufficient_context.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome counts of a finished batch run.
    pub fn record_batch(&self, written: u64, skipped: u64, failed: u64) {
        self.batch_files_written.fetch_add(written, Ordering::Relaxed);
        self.batch_files_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.batch_files_failed.fetch_add(failed, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            ingestion_failures: self.ingestion_failures.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            insufficient_context: self.insufficient_context.load(Ordering::Relaxed),
            batch_files_written: self.batch_files_written.load(Ordering::Relaxed),
            batch_files_skipped: self.batch_files_skipped.load(Ordering::Relaxed),
            batch_files_failed: self.batch_files_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of session counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents successfully ingested since startup.
    pub documents_ingested: u64,
    /// Chunks committed to the index since startup.
    pub chunks_indexed: u64,
    /// Documents whose ingestion failed.
    pub ingestion_failures: u64,
    /// Questions that produced an answer (grounded or not).
    pub questions_answered: u64,
    /// Answers that fell back to the insufficient-context reply.
    pub insufficient_context: u64,
    /// Batch artifacts written.
    pub batch_files_written: u64,
    /// Batch inputs skipped because they were empty.
    pub batch_files_skipped: u64,
    /// Batch inputs that failed.
    pub batch_files_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = SessionMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);
        metrics.record_ingestion_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.ingestion_failures, 1);
    }

    #[test]
    fn answers_split_grounded_and_fallback() {
        let metrics = SessionMetrics::new();
        metrics.record_answer(true);
        metrics.record_answer(false);
        metrics.record_batch(1, 2, 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.insufficient_context, 1);
        assert_eq!(snapshot.batch_files_written, 1);
        assert_eq!(snapshot.batch_files_skipped, 2);
        assert_eq!(snapshot.batch_files_failed, 3);
    }

    #[test]
    fn snapshot_starts_empty() {
        let snapshot = SessionMetrics::new().snapshot();
        assert_eq!(snapshot.documents_ingested, 0);
        assert_eq!(snapshot.questions_answered, 0);
    }
}
