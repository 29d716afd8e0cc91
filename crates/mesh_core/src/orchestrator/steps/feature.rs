//! Feature extraction and matching stages.

use super::super::errors::{StepError, StepResult};
use super::super::stage::{require_output_dir, PipelineStep, StageCommand};
use super::super::types::{Context, PipelineState, StageInputs};
use super::meshroom::{
    batch_command, require_node, require_toolchain, FEATURE_EXTRACTION_NODE,
    FEATURE_MATCHING_NODE,
};

/// Detects keypoints and descriptors in every frame.
#[derive(Debug, Default)]
pub struct FeatureExtractionStep;

impl FeatureExtractionStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for FeatureExtractionStep {
    fn name(&self) -> &str {
        "FeatureExtraction"
    }

    fn state(&self) -> PipelineState {
        PipelineState::FeatureExtraction
    }

    fn description(&self) -> &str {
        "Extract image features from sampled frames"
    }

    fn validate_input(&self, _ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;

        if !inputs.frames_dir().is_dir() {
            return Err(StepError::invalid_input(format!(
                "frame directory not found: {}",
                inputs.frames_dir().display()
            )));
        }
        if inputs.frames.is_empty() {
            return Err(StepError::invalid_input(format!(
                "no frames in {}",
                inputs.frames_dir().display()
            )));
        }
        Ok(())
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, FEATURE_EXTRACTION_NODE)
    }

    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        require_output_dir(&ctx.layout.node_dir(FEATURE_EXTRACTION_NODE), FEATURE_EXTRACTION_NODE)
    }
}

/// Matches features between frame pairs.
#[derive(Debug, Default)]
pub struct MatchingStep;

impl MatchingStep {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineStep for MatchingStep {
    fn name(&self) -> &str {
        "Matching"
    }

    fn state(&self) -> PipelineState {
        PipelineState::Matching
    }

    fn description(&self) -> &str {
        "Match features between frames"
    }

    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()> {
        require_toolchain(inputs)?;
        require_node(ctx, FEATURE_EXTRACTION_NODE)
    }

    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand {
        batch_command(ctx, inputs, FEATURE_MATCHING_NODE)
    }

    fn validate_output(&self, ctx: &Context) -> StepResult<()> {
        require_output_dir(&ctx.layout.node_dir(FEATURE_MATCHING_NODE), FEATURE_MATCHING_NODE)
    }
}
