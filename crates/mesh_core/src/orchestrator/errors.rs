//! Error types for the reconstruction pipeline.
//!
//! Errors carry context that chains through layers:
//! Job → State → Stage → Detail

use std::io;

use thiserror::Error;

use crate::frames::ExtractionError;
use crate::models::JobError;
use crate::toolchain::ProvisioningError;

use super::types::PipelineState;

/// Fatal pipeline error. Every variant ends the run in `Failed`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The job definition itself is unusable.
    #[error("Job '{job_name}' is invalid: {source}")]
    InvalidJob {
        job_name: String,
        #[source]
        source: JobError,
    },

    /// Directories or other job scaffolding could not be created.
    #[error("Job '{job_name}' setup failed: {message}")]
    Setup { job_name: String, message: String },

    /// The toolchain could not be made available.
    #[error("Job '{job_name}' failed provisioning: {source}")]
    Provisioning {
        job_name: String,
        #[source]
        source: ProvisioningError,
    },

    /// Frame sampling failed.
    #[error("Job '{job_name}' failed frame extraction: {source}")]
    Extraction {
        job_name: String,
        #[source]
        source: ExtractionError,
    },

    /// A stage's pre- or post-condition did not hold.
    #[error("Job '{job_name}' failed at stage '{stage}': {source}")]
    StepFailed {
        job_name: String,
        stage: String,
        state: PipelineState,
        #[source]
        source: StepError,
    },

    /// A fatal stage's external command failed.
    #[error("Job '{job_name}' failed at stage '{stage}' with exit code {exit_code}")]
    StageFailed {
        job_name: String,
        stage: String,
        state: PipelineState,
        exit_code: i32,
        /// Combined tool output in arrival order.
        diagnostics: Vec<String>,
    },
}

impl PipelineError {
    pub fn setup(job_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Setup {
            job_name: job_name.into(),
            message: message.into(),
        }
    }

    pub fn step_failed(
        job_name: impl Into<String>,
        stage: impl Into<String>,
        state: PipelineState,
        source: StepError,
    ) -> Self {
        Self::StepFailed {
            job_name: job_name.into(),
            stage: stage.into(),
            state,
            source,
        }
    }

    /// The state the pipeline was in when this error occurred.
    pub fn failed_state(&self) -> PipelineState {
        match self {
            PipelineError::InvalidJob { .. } | PipelineError::Setup { .. } => {
                PipelineState::Created
            }
            PipelineError::Provisioning { .. } => PipelineState::Provisioning,
            PipelineError::Extraction { .. } => PipelineState::FrameExtraction,
            PipelineError::StepFailed { state, .. } => *state,
            PipelineError::StageFailed { state, .. } => *state,
        }
    }

    /// Name of the failing stage or phase.
    pub fn stage_name(&self) -> String {
        match self {
            PipelineError::StepFailed { stage, .. } | PipelineError::StageFailed { stage, .. } => {
                stage.clone()
            }
            other => other.failed_state().to_string(),
        }
    }

    /// Process exit code for this failure, never 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::StageFailed { exit_code, .. } => (*exit_code).max(1),
            PipelineError::Extraction { source, .. } => source.exit_code(),
            _ => 1,
        }
    }

    /// Captured tool output, if the failure came from a tool.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            PipelineError::StageFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

/// Error from a stage's checks, with operation context.
#[derive(Error, Debug)]
pub enum StepError {
    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for stage checks.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_reports_its_exit_code() {
        let err = PipelineError::StageFailed {
            job_name: "IMG_2604".into(),
            stage: "SparseReconstruction".into(),
            state: PipelineState::SparseReconstruction,
            exit_code: 3,
            diagnostics: vec!["Not enough matches".into()],
        };

        let msg = err.to_string();
        assert!(msg.contains("IMG_2604"));
        assert!(msg.contains("SparseReconstruction"));
        assert!(msg.contains("exit code 3"));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.failed_state(), PipelineState::SparseReconstruction);
        assert_eq!(err.diagnostics(), ["Not enough matches".to_string()]);
    }

    #[test]
    fn exit_code_is_never_zero() {
        let err = PipelineError::StageFailed {
            job_name: "j".into(),
            stage: "Meshing".into(),
            state: PipelineState::Meshing,
            exit_code: -2,
            diagnostics: Vec::new(),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(PipelineError::setup("j", "no disk").exit_code(), 1);
    }

    #[test]
    fn provisioning_failure_is_exit_one() {
        let err = PipelineError::Provisioning {
            job_name: "j".into(),
            source: ProvisioningError::HttpStatus {
                url: "https://example.invalid/a.tar.gz".into(),
                status: 404,
            },
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.failed_state(), PipelineState::Provisioning);
        assert_eq!(err.stage_name(), "Provisioning");
        assert!(err.to_string().contains("a.tar.gz"));
    }
}
