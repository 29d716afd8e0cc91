//! Fusion and meshing stage.

use super::super::errors::StepResult;
use super::super::stage::{require_output_dir, PipelineStep, StageCommand};
use super::super::types::{Context, PipelineState, StageInputs};
use super::meshroom::{
    batch_command, require_node, require_toolchain, DEPTH_MAP_NODE, MESH_FILTERING_NODE,
};

/// Fuses depth maps into a surface and cleans the mesh.
#[derive(Debug, Default)]
pub struct MeshingStep;

impl MeshingStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for MeshingStep {
    fn name(&self) -> &str {
        "Meshing"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Meshing
    }

    fn description(&self) -> &str {
        "Fuse depth maps into a filtered mesh"
    }

    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;
        require_node(ctx, DEPTH_MAP_NODE)
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, MESH_FILTERING_NODE)
    }

    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        require_output_dir(&ctx.layout.node_dir(MESH_FILTERING_NODE), MESH_FILTERING_NODE)
    }
}
