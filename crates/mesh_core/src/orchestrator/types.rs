//! Core types for the reconstruction pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifacts::CollectionOutcome;
use crate::config::Settings;
use crate::logging::JobLogger;
use crate::models::{Artifact, FrameCorpus, Job, WorkLayout};
use crate::resources::AcceleratorSet;
use crate::toolchain::Toolchain;

use super::runner::{BestEffortFailure, StageResult, StageStatus};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (state_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// States of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Created,
    Provisioning,
    FrameExtraction,
    FeatureExtraction,
    Matching,
    SparseReconstruction,
    Undistortion,
    DenseReconstruction,
    Meshing,
    Texturing,
    ArtifactCollection,
    Completed,
    Failed,
}

impl PipelineState {
    /// Non-terminal states in the order the pipeline visits them.
    pub const SEQUENCE: [PipelineState; 11] = [
        PipelineState::Created,
        PipelineState::Provisioning,
        PipelineState::FrameExtraction,
        PipelineState::FeatureExtraction,
        PipelineState::Matching,
        PipelineState::SparseReconstruction,
        PipelineState::Undistortion,
        PipelineState::DenseReconstruction,
        PipelineState::Meshing,
        PipelineState::Texturing,
        PipelineState::ArtifactCollection,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    /// The state reached when this one succeeds. Terminal states stay put.
    pub fn next(&self) -> PipelineState {
        match self {
            PipelineState::Created => PipelineState::Provisioning,
            PipelineState::Provisioning => PipelineState::FrameExtraction,
            PipelineState::FrameExtraction => PipelineState::FeatureExtraction,
            PipelineState::FeatureExtraction => PipelineState::Matching,
            PipelineState::Matching => PipelineState::SparseReconstruction,
            PipelineState::SparseReconstruction => PipelineState::Undistortion,
            PipelineState::Undistortion => PipelineState::DenseReconstruction,
            PipelineState::DenseReconstruction => PipelineState::Meshing,
            PipelineState::Meshing => PipelineState::Texturing,
            PipelineState::Texturing => PipelineState::ArtifactCollection,
            PipelineState::ArtifactCollection => PipelineState::Completed,
            PipelineState::Completed => PipelineState::Completed,
            PipelineState::Failed => PipelineState::Failed,
        }
    }

    /// Rough completion percentage when entering this state.
    pub fn percent(&self) -> u32 {
        match self {
            PipelineState::Completed => 100,
            PipelineState::Failed => 100,
            state => {
                let position = Self::SEQUENCE
                    .iter()
                    .position(|s| s == state)
                    .unwrap_or(0);
                (position * 100 / Self::SEQUENCE.len()) as u32
            }
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Read-only context passed to pipeline stages.
///
/// Contains the job and shared resources stages can read but not modify.
pub struct Context {
    /// The reconstruction request.
    pub job: Job,
    /// Application settings.
    pub settings: Settings,
    /// Paths under the job's working directory.
    pub layout: WorkLayout,
    /// Per-job logger.
    pub logger: Arc<JobLogger>,
    /// Optional progress callback.
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    /// Create a new context for a job.
    pub fn new(job: Job, settings: Settings, logger: Arc<JobLogger>) -> Self {
        let layout = Self::layout_for(&job, &settings);
        Self {
            job,
            settings,
            layout,
            logger,
            progress_callback: None,
        }
    }

    /// The directory layout a job will use under these settings.
    pub fn layout_for(job: &Job, settings: &Settings) -> WorkLayout {
        let mut layout = WorkLayout::new(
            &job.work_dir,
            &settings.reconstruction.cache_dir_name,
            &settings.reconstruction.graph_file,
        );
        if !settings.paths.logs_folder.is_empty() {
            layout.logs_dir = PathBuf::from(&settings.paths.logs_folder);
        }
        layout
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, state_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(state_name, percent, message);
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job.name
    }
}

/// Inputs materialized before the first reconstruction stage and shared,
/// unchanged, by every stage.
#[derive(Debug, Clone)]
pub struct StageInputs {
    pub toolchain: Toolchain,
    pub accelerators: Arc<AcceleratorSet>,
    /// Frames the reconstruction reads (converted ones, when enabled).
    pub frames: FrameCorpus,
}

impl StageInputs {
    pub fn frames_dir(&self) -> &Path {
        self.frames.dir()
    }
}

/// One stage's entry in the run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub status: StageStatus,
    pub exit_code: i32,
    pub duration_secs: f64,
}

impl From<&StageResult> for StageRecord {
    fn from(result: &StageResult) -> Self {
        Self {
            stage: result.stage.clone(),
            status: result.status,
            exit_code: result.exit_code,
            duration_secs: result.duration.as_secs_f64(),
        }
    }
}

/// The failure recorded in a manifest of a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub state: PipelineState,
    pub stage: String,
    pub exit_code: i32,
    pub message: String,
    /// Last lines of tool output.
    pub diagnostics_tail: Vec<String>,
}

/// JSON manifest written to `output/pipeline_report.json` when a run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub job: Job,
    pub state: PipelineState,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<PathBuf>,
    pub accelerators: AcceleratorSet,
    pub frame_count: usize,
    pub stages: Vec<StageRecord>,
    pub best_effort_failures: Vec<BestEffortFailure>,
    pub artifacts: Vec<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl PipelineReport {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            state: PipelineState::Created,
            started_at: chrono::Local::now().to_rfc3339(),
            finished_at: None,
            toolchain: None,
            accelerators: AcceleratorSet::default(),
            frame_count: 0,
            stages: Vec::new(),
            best_effort_failures: Vec::new(),
            artifacts: Vec::new(),
            collection_warning: None,
            failure: None,
        }
    }

    /// Record the artifact collector's outcome.
    pub fn record_collection(&mut self, outcome: &CollectionOutcome) {
        match outcome {
            CollectionOutcome::Collected { artifacts, .. } => {
                self.artifacts = artifacts.clone();
                self.collection_warning = None;
            }
            other => self.collection_warning = Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_in_fixed_order() {
        let mut state = PipelineState::Created;
        let mut visited = vec![state];
        while !state.is_terminal() {
            state = state.next();
            visited.push(state);
        }
        assert_eq!(visited.len(), 12);
        assert_eq!(visited[..11], PipelineState::SEQUENCE);
        assert_eq!(visited[11], PipelineState::Completed);
    }

    #[test]
    fn terminal_states_are_absorbing() {
        assert_eq!(PipelineState::Failed.next(), PipelineState::Failed);
        assert_eq!(PipelineState::Completed.next(), PipelineState::Completed);
    }

    #[test]
    fn percent_grows_monotonically() {
        let percents: Vec<u32> = PipelineState::SEQUENCE.iter().map(|s| s.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(PipelineState::Completed.percent(), 100);
    }

    #[test]
    fn logs_folder_overrides_layout() {
        let job = Job::new("/videos/a.mov", "/jobs/a");
        let mut settings = Settings::default();
        assert_eq!(
            Context::layout_for(&job, &settings).logs_dir,
            PathBuf::from("/jobs/a/logs")
        );

        settings.paths.logs_folder = "/var/log/mesh".to_string();
        assert_eq!(
            Context::layout_for(&job, &settings).logs_dir,
            PathBuf::from("/var/log/mesh")
        );
    }
}
