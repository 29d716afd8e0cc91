//! Pipeline orchestrator for reconstruction jobs.
//!
//! A job walks a fixed state sequence. Provisioning and frame extraction
//! are built in; every reconstruction stage is a [`PipelineStep`] that
//! runs the toolchain up to one graph node.
//!
//! # Architecture
//!
//! ```text
//! ReconstructionPipeline
//!     ├── Provisioning        (system deps, toolchain, accelerators)
//!     ├── FrameExtraction     (sample, cap, optional conversion)
//!     ├── Step: FeatureExtraction
//!     ├── Step: Matching
//!     ├── Step: SparseReconstruction
//!     ├── Step: Undistortion
//!     ├── Step: DenseReconstruction
//!     ├── Step: Meshing
//!     ├── Step: Texturing
//!     └── ArtifactCollection
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mesh_core::config::Settings;
//! use mesh_core::logging::{JobLogger, LogConfig};
//! use mesh_core::models::Job;
//! use mesh_core::orchestrator::{create_standard_pipeline, Context};
//!
//! let job = Job::new("IMG_2604.MOV", "/tmp/meshjob");
//! let logger = JobLogger::new(&job.name, "/tmp/meshjob/logs", LogConfig::default(), None).unwrap();
//! let ctx = Context::new(job, Settings::default(), Arc::new(logger));
//!
//! match create_standard_pipeline(ctx).run() {
//!     Ok(run) => println!("{}", run.collection),
//!     Err(e) => eprintln!("{} (exit {})", e, e.exit_code()),
//! }
//! ```

mod errors;
mod pipeline;
mod runner;
mod stage;
pub mod steps;
mod types;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{standard_steps, PipelineRunResult, ReconstructionPipeline};
pub use runner::{BestEffortFailure, StageResult, StageRunner, StageStatus};
pub use stage::{Criticality, PipelineStep, StageCommand};
pub use steps::{
    DenseReconstructionStep, FeatureExtractionStep, MatchingStep, MeshingStep,
    SparseReconstructionStep, TexturingStep, UndistortionStep,
};
pub use types::{
    Context, FailureRecord, PipelineReport, PipelineState, ProgressCallback, StageInputs,
    StageRecord,
};

/// Create a pipeline running the standard stages in order:
///
/// 1. FeatureExtraction - describe keypoints in every frame
/// 2. Matching - match features across frames
/// 3. SparseReconstruction - camera poses and sparse cloud
/// 4. Undistortion - undistorted images for dense work
/// 5. DenseReconstruction - depth maps
/// 6. Meshing - mesh and mesh filtering
/// 7. Texturing - textured mesh
pub fn create_standard_pipeline(ctx: Context) -> ReconstructionPipeline {
    ReconstructionPipeline::new(ctx)
}
