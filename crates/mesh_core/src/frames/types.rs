//! Types for frame sampling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::FrameCorpus;
use crate::process::EXIT_SPAWN_FAILED;

/// Errors that can occur while sampling frames.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Video not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to start {tool}: {source}")]
    SpawnFailed { tool: String, source: io::Error },

    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    #[error("Frame {index} is missing from {dir}")]
    NonContiguous { dir: PathBuf, index: usize },

    #[error("Failed to convert {path}: {message}")]
    Conversion { path: PathBuf, message: String },

    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ExtractionError {
    /// Exit code the job reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractionError::CommandFailed { exit_code, .. } => (*exit_code).max(1),
            ExtractionError::SpawnFailed { .. } => EXIT_SPAWN_FAILED,
            _ => 1,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for sampling operations.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// What a sampling run produced.
#[derive(Debug, Clone)]
pub struct SamplingOutcome {
    /// Frames kept after capping, 1..=N.
    pub corpus: FrameCorpus,
    /// Frames the extraction tool wrote before capping.
    pub raw_count: usize,
    /// Frames deleted by the cap.
    pub removed: usize,
    /// Stale frames from an earlier run deleted before extraction.
    pub stale_removed: usize,
}
