//! Logging infrastructure for reconstruction jobs.
//!
//! This module provides:
//! - Per-job loggers with file + console dual output
//! - Compact mode that keeps external tool chatter out of the log
//! - Tail buffer for stage failure diagnosis
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use mesh_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("IMG_2604", "/tmp/meshjob/logs", LogConfig::default(), None).unwrap();
//!
//! logger.phase("FrameExtraction");
//! logger.command("ffmpeg -y -i IMG_2604.MOV ...");
//! logger.success("Extracted 120 frames");
//! ```

mod job_logger;
mod types;

pub use job_logger::JobLogger;
pub use types::{ConsoleCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::EnvFilter;

/// Build the filter used by the global subscriber.
///
/// Respects `RUST_LOG` and falls back to the provided default level.
pub fn env_filter(default_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()))
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
