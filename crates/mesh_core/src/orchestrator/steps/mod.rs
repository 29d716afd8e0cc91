//! Reconstruction stage implementations.
//!
//! Each stage runs the toolchain's batch executable up to one node of the
//! photogrammetry graph.

mod dense;
mod feature;
mod meshing;
pub mod meshroom;
mod sfm;
mod texturing;

pub use dense::{DenseReconstructionStep, UndistortionStep};
pub use feature::{FeatureExtractionStep, MatchingStep};
pub use meshing::MeshingStep;
pub use sfm::SparseReconstructionStep;
pub use texturing::TexturingStep;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Settings;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{Frame, FrameCorpus, FrameFormat, Job};
    use crate::orchestrator::{Context, PipelineStep, StageInputs, StepError};
    use crate::resources::AcceleratorSet;
    use crate::toolchain::Toolchain;

    fn fixture(dir: &std::path::Path, frame_count: usize) -> (Context, StageInputs) {
        let job = Job::new(dir.join("clip.mov"), dir.join("work"));
        let settings = Settings::default();
        let logger = JobLogger::new("steps", dir.join("logs"), LogConfig::default(), None).unwrap();
        let ctx = Context::new(job, settings, Arc::new(logger));

        let frames_dir = ctx.layout.frames_dir.clone();
        crate::test_support::touch_frames(&frames_dir, frame_count, "png");
        let frames = (1..=frame_count)
            .map(|index| Frame {
                index,
                path: frames_dir.join(crate::models::frame_file_name(index, FrameFormat::Png)),
            })
            .collect();

        let exe = dir.join("Meshroom-2025.1.0-Linux").join("meshroom_batch");
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(&exe, b"").unwrap();

        let inputs = StageInputs {
            toolchain: Toolchain {
                root: exe.parent().unwrap().to_path_buf(),
                executable: exe,
            },
            accelerators: Arc::new(AcceleratorSet::cpu_only()),
            frames: FrameCorpus::new(&frames_dir, FrameFormat::Png, frames).unwrap(),
        };
        (ctx, inputs)
    }

    fn all_steps() -> Vec<Box<dyn PipelineStep>> {
        vec![
            Box::new(FeatureExtractionStep::new()),
            Box::new(MatchingStep::new()),
            Box::new(SparseReconstructionStep::new()),
            Box::new(UndistortionStep::new()),
            Box::new(DenseReconstructionStep::new()),
            Box::new(MeshingStep::new()),
            Box::new(TexturingStep::new()),
        ]
    }

    #[test]
    fn stages_target_their_nodes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, inputs) = fixture(dir.path(), 3);

        let nodes: Vec<String> = all_steps()
            .iter()
            .map(|step| {
                let cmd = step.command(&ctx, &inputs);
                let at = cmd.args.iter().position(|a| a == "--toNode").unwrap();
                cmd.args[at + 1].clone()
            })
            .collect();

        assert_eq!(
            nodes,
            vec![
                "FeatureExtraction",
                "FeatureMatching",
                "StructureFromMotion",
                "PrepareDenseScene",
                "DepthMapFilter",
                "MeshFiltering",
                "Texturing"
            ]
        );
    }

    #[test]
    fn command_shares_cache_graph_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, inputs) = fixture(dir.path(), 3);

        let cmd = SparseReconstructionStep::new().command(&ctx, &inputs);
        assert_eq!(cmd.program, inputs.toolchain.executable);

        let value_of = |flag: &str| {
            let at = cmd.args.iter().position(|a| a == flag).unwrap();
            cmd.args[at + 1].clone()
        };
        assert_eq!(value_of("--input"), ctx.layout.frames_dir.to_string_lossy());
        assert_eq!(value_of("--cache"), ctx.layout.cache_dir.to_string_lossy());
        assert_eq!(value_of("--save"), ctx.layout.graph_file.to_string_lossy());
        assert_eq!(value_of("--pipeline"), "photogrammetry");

        let overrides_at = cmd.args.iter().position(|a| a == "--paramOverrides").unwrap();
        assert_eq!(
            cmd.args[overrides_at + 1..],
            [
                "FeatureExtraction.describerPreset=high",
                "FeatureExtraction.describerQuality=ultra",
                "Meshing.maxPoints=5000000"
            ]
        );
    }

    #[test]
    fn states_follow_pipeline_order() {
        let states: Vec<_> = all_steps().iter().map(|s| s.state()).collect();
        assert!(states.windows(2).all(|w| w[0].next() == w[1]));
    }

    #[test]
    fn feature_extraction_requires_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, inputs) = fixture(dir.path(), 0);

        let err = FeatureExtractionStep::new()
            .validate_input(&ctx, &inputs)
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidInput(_)));
    }

    #[test]
    fn later_stages_require_predecessor_output() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, inputs) = fixture(dir.path(), 3);

        let matching = MatchingStep::new();
        assert!(matching.validate_input(&ctx, &inputs).is_err());

        std::fs::create_dir_all(ctx.layout.node_dir("FeatureExtraction")).unwrap();
        assert!(matching.validate_input(&ctx, &inputs).is_ok());
        assert!(matching.validate_output(&ctx).is_err());

        std::fs::create_dir_all(ctx.layout.node_dir("FeatureMatching")).unwrap();
        assert!(matching.validate_output(&ctx).is_ok());
    }
}
