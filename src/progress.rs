//! Incremental progress reporting for ingestion and batch runs.
//!
//! Events are emitted from real work: after every embedding request during ingestion and
//! after every file during a batch run. Front ends decide how to render them.

use std::io::Write;
use std::path::PathBuf;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A document entered the ingestion pipeline.
    DocumentStarted {
        /// Source identifier of the document.
        source: String,
        /// One-based position within the current upload.
        position: usize,
        /// Number of documents in the current upload.
        total: usize,
    },
    /// Another slice of a document's chunks has been embedded.
    ChunksEmbedded {
        /// Source identifier of the document.
        source: String,
        /// Chunks embedded so far.
        embedded: usize,
        /// Chunks produced for the document.
        total: usize,
    },
    /// A document left the ingestion pipeline.
    DocumentFinished {
        /// Source identifier of the document.
        source: String,
        /// Human-readable outcome.
        outcome: String,
    },
    /// A batch file is about to be processed.
    FileStarted {
        /// Input path.
        path: PathBuf,
        /// One-based position within the batch.
        position: usize,
        /// Number of files in the batch.
        total: usize,
    },
    /// A batch file has been processed.
    FileFinished {
        /// Input path.
        path: PathBuf,
        /// Human-readable outcome.
        outcome: String,
    },
}

/// Receives progress events; implementations render them for a front end.
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event.
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Human-friendly progress lines on stderr.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::DocumentStarted {
                source,
                position,
                total,
            } => format!("[{position}/{total}] ingesting {source}\n"),
            ProgressEvent::ChunksEmbedded {
                source,
                embedded,
                total,
            } => {
                let percent = if *total == 0 {
                    100
                } else {
                    embedded * 100 / total
                };
                format!("  {source}  embedded {embedded} / {total} chunks ({percent}%)\n")
            }
            ProgressEvent::DocumentFinished { source, outcome } => {
                format!("  {source}  {outcome}\n")
            }
            ProgressEvent::FileStarted {
                path,
                position,
                total,
            } => format!("[{position}/{total}] {}\n", path.display()),
            ProgressEvent::FileFinished { path, outcome } => {
                format!("  {}  {outcome}\n", path.display())
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}
