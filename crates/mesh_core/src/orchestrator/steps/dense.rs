//! Undistortion and dense reconstruction stages.

use super::super::errors::StepResult;
use super::super::stage::{require_output_dir, PipelineStep, StageCommand};
use super::super::types::{Context, PipelineState, StageInputs};
use super::meshroom::{
    batch_command, require_node, require_toolchain, DEPTH_MAP_NODE, PREPARE_DENSE_SCENE_NODE,
    STRUCTURE_FROM_MOTION_NODE,
};

/// Writes undistorted images for the dense stage.
#[derive(Debug, Default)]
pub struct UndistortionStep;

impl UndistortionStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for UndistortionStep {
    fn name(&self) -> &str {
        "Undistortion"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Undistortion
    }

    fn description(&self) -> &str {
        "Undistort images using recovered intrinsics"
    }

    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;
        require_node(ctx, STRUCTURE_FROM_MOTION_NODE)
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, PREPARE_DENSE_SCENE_NODE)
    }

    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        require_output_dir(
            &ctx.layout.node_dir(PREPARE_DENSE_SCENE_NODE),
            PREPARE_DENSE_SCENE_NODE,
        )
    }
}

/// Estimates and filters per-view depth maps.
///
/// The heaviest stage and the one that uses the accelerators.
#[derive(Debug, Default)]
pub struct DenseReconstructionStep;

impl DenseReconstructionStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for DenseReconstructionStep {
    fn name(&self) -> &str {
        "DenseReconstruction"
    }

    fn state(&self) -> PipelineState {
        PipelineState::DenseReconstruction
    }

    fn description(&self) -> &str {
        "Estimate and filter dense depth maps"
    }

    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;
        require_node(ctx, PREPARE_DENSE_SCENE_NODE)
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, DEPTH_MAP_NODE)
    }

    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        require_output_dir(&ctx.layout.node_dir(DEPTH_MAP_NODE), DEPTH_MAP_NODE)
    }
}
