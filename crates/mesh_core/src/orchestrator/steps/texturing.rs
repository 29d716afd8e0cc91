//! Texturing stage.

use super::super::errors::StepResult;
use super::super::stage::{PipelineStep, StageCommand};
use super::super::types::{Context, PipelineState, StageInputs};
use super::meshroom::{
    batch_command, require_node, require_toolchain, MESH_FILTERING_NODE, TEXTURING_NODE,
};

/// Projects the frames onto the mesh, producing material and textures.
#[derive(Debug, Default)]
pub struct TexturingStep;

impl TexturingStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for TexturingStep {
    fn name(&self) -> &str {
        "Texturing"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Texturing
    }

    fn description(&self) -> &str {
        "Texture the mesh from the source frames"
    }

    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;
        require_node(ctx, MESH_FILTERING_NODE)
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, TEXTURING_NODE)
    }

    /// The texturing layout varies between toolchain releases, so a
    /// missing node directory is left for artifact collection to report.
    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        let node_dir = ctx.layout.node_dir(TEXTURING_NODE);
        if !node_dir.is_dir() {
            tracing::warn!(
                "Texturing exited cleanly but {} is missing",
                node_dir.display()
            );
        }
        Ok(())
    }
}
