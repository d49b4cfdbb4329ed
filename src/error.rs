use std::path::PathBuf;

use thiserror::Error;

/// Failures callers may want to tell apart. Plain I/O goes through `anyhow`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no files matched pattern: {pattern}")]
    NoSegmentCsvs { pattern: String },

    #[error("column '{column}' not found in {path:?}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("malformed archive at byte {offset}: {reason}")]
    MalformedArchive { offset: u64, reason: String },

    #[error("{lines} wet paths cannot be split into {chunks} equal chunks")]
    UnevenChunks { lines: usize, chunks: usize },
}
