//! Sparse structure-from-motion stage.

use super::super::errors::StepResult;
use super::super::stage::{require_output_dir, PipelineStep, StageCommand};
use super::super::types::{Context, PipelineState, StageInputs};
use super::meshroom::{
    batch_command, require_node, require_toolchain, FEATURE_MATCHING_NODE,
    STRUCTURE_FROM_MOTION_NODE,
};

/// Recovers camera poses and a sparse point cloud.
#[derive(Debug, Default)]
pub struct SparseReconstructionStep;

impl SparseReconstructionStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for SparseReconstructionStep {
    fn name(&self) -> &str {
        "SparseReconstruction"
    }

    fn state(&self) -> PipelineState {
        PipelineState::SparseReconstruction
    }

    fn description(&self) -> &str {
        "Recover camera poses and sparse structure"
    }

    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;
        require_node(ctx, FEATURE_MATCHING_NODE)
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, STRUCTURE_FROM_MOTION_NODE)
    }

    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        require_output_dir(
            &ctx.layout.node_dir(STRUCTURE_FROM_MOTION_NODE),
            STRUCTURE_FROM_MOTION_NODE,
        )
    }
}
