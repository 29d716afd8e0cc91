//! Shared invocation of the toolchain's batch runner.
//!
//! Every stage runs the same executable against the same cache and graph,
//! stopping at a different node. Nodes already computed in the cache are
//! reused by the tool, so stage N only computes its own node.

use crate::config::ReconstructionSettings;

use super::super::errors::{StepError, StepResult};
use super::super::stage::{require_dir, StageCommand};
use super::super::types::{Context, StageInputs};

/// Toolchain node names, one per stage, in pipeline order.
pub const FEATURE_EXTRACTION_NODE: &str = "FeatureExtraction";
pub const FEATURE_MATCHING_NODE: &str = "FeatureMatching";
pub const STRUCTURE_FROM_MOTION_NODE: &str = "StructureFromMotion";
pub const PREPARE_DENSE_SCENE_NODE: &str = "PrepareDenseScene";
pub const DEPTH_MAP_NODE: &str = "DepthMapFilter";
pub const MESH_FILTERING_NODE: &str = "MeshFiltering";
pub const TEXTURING_NODE: &str = "Texturing";

/// `--paramOverrides` values passed on every invocation.
pub fn param_overrides(settings: &ReconstructionSettings) -> Vec<String> {
    vec![
        format!(
            "{}.describerPreset={}",
            FEATURE_EXTRACTION_NODE, settings.describer_preset
        ),
        format!(
            "{}.describerQuality={}",
            FEATURE_EXTRACTION_NODE, settings.describer_quality
        ),
        format!("Meshing.maxPoints={}", settings.max_points),
    ]
}

/// Batch invocation that computes the graph up to `node`.
pub fn batch_command(ctx: &Context, inputs: &StageInputs, node: &str) -> StageCommand {
    let rec = &ctx.settings.reconstruction;
    StageCommand::new(&inputs.toolchain.executable)
        .path_flag("--input", inputs.frames_dir())
        .path_flag("--output", &ctx.layout.output_dir)
        .path_flag("--cache", &ctx.layout.cache_dir)
        .path_flag("--save", &ctx.layout.graph_file)
        .flag("--pipeline", rec.pipeline.as_str())
        .flag("--toNode", node)
        .arg("--paramOverrides")
        .args(param_overrides(rec))
}

/// Input check: the node a stage builds on has been computed.
pub fn require_node(ctx: &Context, node: &str) -> StepResult<()> {
    require_dir(&ctx.layout.node_dir(node), &format!("{} output", node))
        .map_err(StepError::invalid_input)
}

/// Input check: the toolchain executable is still in place.
pub fn require_toolchain(inputs: &StageInputs) -> StepResult<()> {
    if inputs.toolchain.executable.is_file() {
        Ok(())
    } else {
        Err(StepError::invalid_input(format!(
            "toolchain executable missing: {}",
            inputs.toolchain.executable.display()
        )))
    }
}
