//! Toolchain provisioning errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Download of {url} failed with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unsupported archive format: {path}")]
    UnsupportedArchive { path: PathBuf },

    #[error("Failed to extract {path}: {message}")]
    Extract { path: PathBuf, message: String },

    #[error("No executable ({names}) found under {path}")]
    ExecutableNotFound { path: PathBuf, names: String },

    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ProvisioningError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
