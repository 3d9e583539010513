//! Batch driver: run every matching file in a directory through the engine or the pipeline.
//!
//! In [`BatchMode::Ask`] each non-empty file's full, trimmed content is the question and the
//! answer lands next to the input as `<input>.<YYYY_MM_DD_HH_MM_SS>.out`. The timestamp is
//! taken once per run. If that path already exists a `-N` counter is appended to the
//! timestamp; existing artifacts are never overwritten.

use crate::{
    answer::{AnswerEngine, QueryError, RetrievalSettings},
    index::VectorIndex,
    processing::{Document, DocumentError, IngestionError, IngestionPipeline},
    progress::{ProgressEvent, ProgressReporter},
};
use globset::{Glob, GlobMatcher};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};
use walkdir::WalkDir;

/// Label preceding the input in an artifact.
pub const INPUT_LABEL: &str = "Input=================>";
/// Label preceding the answer in an artifact.
pub const OUTPUT_LABEL: &str = "Output=================>";

/// Failures that prevent a batch from starting.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The file-name pattern is not a valid glob.
    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as supplied.
        pattern: String,
        /// Parser error.
        #[source]
        source: globset::Error,
    },
    /// The source directory could not be listed.
    #[error("failed to list {}: {source}", dir.display())]
    Discovery {
        /// Directory being scanned.
        dir: PathBuf,
        /// Underlying walk error.
        #[source]
        source: walkdir::Error,
    },
    /// The run timestamp could not be rendered.
    #[error("failed to format run timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Why a single file failed. Recorded against that file only.
#[derive(Debug, Error)]
pub enum FileError {
    /// Reading the input or writing the artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The engine could not answer.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The pipeline rejected the document.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
}

/// What the batch does with each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Ask the file content as a question and write an artifact.
    #[default]
    Ask,
    /// Ingest the file into the index; no artifact.
    Ingest,
}

/// Directory, pattern, and mode of a batch run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Directory scanned (not recursively).
    pub dir: PathBuf,
    /// Glob matched against file names, e.g. `*.txt`.
    pub pattern: String,
    /// Per-file action.
    pub mode: BatchMode,
}

/// Result for one input file.
#[derive(Debug)]
pub enum FileOutcome {
    /// An artifact was written.
    Written {
        /// Input file.
        input: PathBuf,
        /// Artifact path.
        output: PathBuf,
    },
    /// The file was empty after trimming.
    SkippedEmpty {
        /// Input file.
        input: PathBuf,
    },
    /// The file was committed to the index.
    Ingested {
        /// Input file.
        input: PathBuf,
        /// Chunks added.
        chunks: usize,
    },
    /// Processing failed; later files still ran.
    Failed {
        /// Input file.
        input: PathBuf,
        /// Cause.
        error: FileError,
    },
}

impl FileOutcome {
    /// Input file the outcome refers to.
    pub fn input(&self) -> &Path {
        match self {
            Self::Written { input, .. }
            | Self::SkippedEmpty { input }
            | Self::Ingested { input, .. }
            | Self::Failed { input, .. } => input,
        }
    }

    /// User-facing status line.
    pub fn message(&self) -> String {
        match self {
            Self::Written { input, output } => {
                format!("Processed {} -> {}", input.display(), output.display())
            }
            Self::SkippedEmpty { input } => format!("file {} is empty", input.display()),
            Self::Ingested { input, chunks } => {
                format!("Ingested {} ({chunks} chunks)", input.display())
            }
            Self::Failed { input, error } => {
                format!("Error processing {}: {error}", input.display())
            }
        }
    }
}

/// Summary of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// Wall-clock start.
    pub started_at: OffsetDateTime,
    /// Wall-clock finish.
    pub finished_at: OffsetDateTime,
    /// Elapsed time.
    pub elapsed: Duration,
    /// One entry per discovered file, in processing order.
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    /// Number of artifacts written.
    pub fn written(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Written { .. }))
    }

    /// Number of files ingested.
    pub fn ingested(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Ingested { .. }))
    }

    /// Number of empty files skipped.
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::SkippedEmpty { .. }))
    }

    /// Number of files that failed.
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| predicate(outcome)).count()
    }
}

/// List files in `dir` whose names match `pattern`, sorted lexicographically.
pub fn discover(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, BatchError> {
    let matcher = build_matcher(pattern)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| BatchError::Discovery {
            dir: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher, BatchError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| BatchError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Render the per-run timestamp suffix.
pub fn run_stamp(at: OffsetDateTime) -> Result<String, BatchError> {
    Ok(at.format(format_description!(
        "[year]_[month]_[day]_[hour]_[minute]_[second]"
    ))?)
}

/// Artifact path for `input`; `attempt > 0` adds the collision counter.
pub fn output_path(input: &Path, stamp: &str, attempt: usize) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    if attempt == 0 {
        name.push(format!(".{stamp}.out"));
    } else {
        name.push(format!(".{stamp}-{attempt}.out"));
    }
    PathBuf::from(name)
}

/// Artifact body: labeled input followed by labeled output.
pub fn render_artifact(input: &str, output: &str) -> String {
    format!("{INPUT_LABEL}\n{input}\n\n{OUTPUT_LABEL}\n{output}\n")
}

fn write_artifact(input: &Path, stamp: &str, body: &str) -> std::io::Result<PathBuf> {
    create_artifact(input, stamp, |file| file.write_all(body.as_bytes()))
}

/// Claim the first free artifact path and fill it. A failed fill removes the partial file.
fn create_artifact(
    input: &Path,
    stamp: &str,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<PathBuf> {
    let mut attempt = 0;
    let (path, mut file) = loop {
        let path = output_path(input, stamp, attempt);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => break (path, file),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(error) => return Err(error),
        }
    };

    if let Err(error) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = std::fs::remove_file(&path) {
            tracing::warn!(
                output = %path.display(),
                error = %cleanup,
                "Could not remove partial artifact"
            );
        }
        return Err(error);
    }
    Ok(path)
}

async fn read_trimmed(path: &Path) -> std::io::Result<String> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content.trim().to_string())
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Answer every matching file with `engine`.
///
/// `index` is `None` when nothing has been ingested; every non-empty file then fails with
/// [`QueryError::NoIndex`] and no artifact is written.
pub async fn run_ask(
    engine: &AnswerEngine,
    index: Option<&VectorIndex>,
    settings: RetrievalSettings,
    request: &BatchRequest,
    progress: &dyn ProgressReporter,
) -> Result<BatchReport, BatchError> {
    let files = discover(&request.dir, &request.pattern)?;
    let started_at = local_now();
    let stamp = run_stamp(started_at)?;
    let clock = Instant::now();
    tracing::info!(
        dir = %request.dir.display(),
        pattern = %request.pattern,
        files = files.len(),
        stamp = %stamp,
        "Starting batch"
    );

    let total = files.len();
    let mut outcomes = Vec::with_capacity(total);
    for (position, input) in files.into_iter().enumerate() {
        progress.report(ProgressEvent::FileStarted {
            path: input.clone(),
            position: position + 1,
            total,
        });
        let outcome = ask_one(engine, index, settings, input, &stamp).await;
        finish_file(progress, &outcome);
        outcomes.push(outcome);
    }

    Ok(finish_report(started_at, clock, outcomes))
}

async fn ask_one(
    engine: &AnswerEngine,
    index: Option<&VectorIndex>,
    settings: RetrievalSettings,
    input: PathBuf,
    stamp: &str,
) -> FileOutcome {
    let content = match read_trimmed(&input).await {
        Ok(content) => content,
        Err(error) => {
            return FileOutcome::Failed {
                input,
                error: error.into(),
            };
        }
    };
    if content.is_empty() {
        return FileOutcome::SkippedEmpty { input };
    }

    let answer = match engine.ask(index, &content, settings).await {
        Ok(answer) => answer,
        Err(error) => {
            return FileOutcome::Failed {
                input,
                error: error.into(),
            };
        }
    };
    match write_artifact(&input, stamp, &render_artifact(&content, &answer.text)) {
        Ok(output) => FileOutcome::Written { input, output },
        Err(error) => FileOutcome::Failed { input, error: error.into() },
    }
}

/// Ingest every matching file into `index`.
pub async fn run_ingest(
    pipeline: &IngestionPipeline,
    index: &mut VectorIndex,
    request: &BatchRequest,
    progress: &dyn ProgressReporter,
) -> Result<BatchReport, BatchError> {
    let files = discover(&request.dir, &request.pattern)?;
    let started_at = local_now();
    let clock = Instant::now();
    tracing::info!(
        dir = %request.dir.display(),
        pattern = %request.pattern,
        files = files.len(),
        "Starting batch ingestion"
    );

    let total = files.len();
    let mut outcomes = Vec::with_capacity(total);
    for (position, input) in files.into_iter().enumerate() {
        progress.report(ProgressEvent::FileStarted {
            path: input.clone(),
            position: position + 1,
            total,
        });
        let outcome = match Document::from_path(&input).await {
            Ok(document) => match pipeline.ingest(index, document, progress).await {
                Ok(report) => FileOutcome::Ingested {
                    input,
                    chunks: report.chunk_count,
                },
                Err(error) => FileOutcome::Failed {
                    input,
                    error: error.into(),
                },
            },
            Err(DocumentError::Empty(_)) => FileOutcome::SkippedEmpty { input },
            Err(error) => FileOutcome::Failed {
                input,
                error: IngestionError::from(error).into(),
            },
        };
        finish_file(progress, &outcome);
        outcomes.push(outcome);
    }

    Ok(finish_report(started_at, clock, outcomes))
}

fn finish_file(progress: &dyn ProgressReporter, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Failed { input, error } => {
            tracing::warn!(input = %input.display(), error = %error, "Batch file failed");
        }
        FileOutcome::SkippedEmpty { input } => {
            tracing::info!(input = %input.display(), "Skipping empty batch file");
        }
        _ => tracing::debug!(input = %outcome.input().display(), "Batch file done"),
    }
    progress.report(ProgressEvent::FileFinished {
        path: outcome.input().to_path_buf(),
        outcome: outcome.message(),
    });
}

fn finish_report(
    started_at: OffsetDateTime,
    clock: Instant,
    outcomes: Vec<FileOutcome>,
) -> BatchReport {
    let report = BatchReport {
        started_at,
        finished_at: local_now(),
        elapsed: clock.elapsed(),
        outcomes,
    };
    tracing::info!(
        written = report.written(),
        ingested = report.ingested(),
        skipped = report.skipped(),
        failed = report.failed(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Batch finished"
    );
    report
}
