//! Reconstruction pipeline: provisioning, sampling, stages, collection.

use std::fs;
use std::sync::Arc;

use crate::artifacts::{ArtifactCollector, CollectionOutcome};
use crate::frames::{convert_corpus, FrameSampler};
use crate::models::FrameCorpus;
use crate::resources::{logical_cpus, thread_hint, AcceleratorSet, ResourceDetector};
use crate::toolchain::{
    ArchiveFetcher, DependencyStatus, HttpFetcher, ProvisionProgress, ProvisioningError,
    ProvisioningResult, SystemDependencies, Toolchain, ToolchainProvisioner,
};

use super::errors::{PipelineError, PipelineResult};
use super::runner::{BestEffortFailure, StageRunner};
use super::stage::{Criticality, PipelineStep};
use super::steps::meshroom::TEXTURING_NODE;
use super::steps::{
    DenseReconstructionStep, FeatureExtractionStep, MatchingStep, MeshingStep,
    SparseReconstructionStep, TexturingStep, UndistortionStep,
};
use super::types::{Context, FailureRecord, PipelineReport, PipelineState, StageInputs, StageRecord};

/// Tool output lines kept in the manifest of a failed run.
const REPORT_DIAGNOSTICS_TAIL: usize = 20;

/// Stage name used for the optional host package installation.
const SYSTEM_DEPENDENCIES_STAGE: &str = "SystemDependencies";

/// One reconstruction run for one job.
///
/// `run` consumes the pipeline: a finished pipeline cannot be re-entered,
/// a retry needs a fresh instance.
pub struct ReconstructionPipeline {
    ctx: Context,
    steps: Vec<Box<dyn PipelineStep>>,
    fetcher: Box<dyn ArchiveFetcher + Send + Sync>,
    state: PipelineState,
}

impl ReconstructionPipeline {
    /// Pipeline with the standard stage sequence.
    pub fn new(ctx: Context) -> Self {
        Self::with_steps(ctx, standard_steps())
    }

    /// Pipeline with a custom stage sequence.
    pub fn with_steps(ctx: Context, steps: Vec<Box<dyn PipelineStep>>) -> Self {
        Self {
            ctx,
            steps,
            fetcher: Box::new(HttpFetcher::new()),
            state: PipelineState::Created,
        }
    }

    /// Replace how the toolchain archive is downloaded.
    pub fn with_fetcher(mut self, fetcher: impl ArchiveFetcher + Send + Sync + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stage names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the job to `Completed` or `Failed`.
    ///
    /// The run manifest is written in both cases. Nothing is rolled back on
    /// failure: frames and partial caches stay on disk.
    pub fn run(mut self) -> PipelineResult<PipelineRunResult> {
        let mut report = PipelineReport::new(self.ctx.job.clone());
        let outcome = self.execute(&mut report);
        report.finished_at = Some(chrono::Local::now().to_rfc3339());

        let result = match outcome {
            Ok(collection) => {
                self.transition(PipelineState::Completed, &mut report);
                self.ctx.logger.success("Pipeline completed successfully");
                self.write_report(&report);
                Ok(PipelineRunResult { report, collection })
            }
            Err(err) => {
                let failed_state = err.failed_state();
                self.transition(PipelineState::Failed, &mut report);
                self.ctx.logger.error(&format!(
                    "Pipeline failed in {}: {}",
                    failed_state, err
                ));

                let diagnostics = err.diagnostics();
                let start = diagnostics.len().saturating_sub(REPORT_DIAGNOSTICS_TAIL);
                report.failure = Some(FailureRecord {
                    state: failed_state,
                    stage: err.stage_name(),
                    exit_code: err.exit_code(),
                    message: err.to_string(),
                    diagnostics_tail: diagnostics[start..].to_vec(),
                });
                self.write_report(&report);
                Err(err)
            }
        };

        self.ctx.logger.flush();
        result
    }

    fn execute(&mut self, report: &mut PipelineReport) -> PipelineResult<CollectionOutcome> {
        let job_name = self.ctx.job.name.clone();

        self.ctx
            .job
            .validate()
            .map_err(|source| PipelineError::InvalidJob {
                job_name: job_name.clone(),
                source,
            })?;

        fs::create_dir_all(&self.ctx.layout.output_dir).map_err(|e| {
            PipelineError::setup(
                &job_name,
                format!(
                    "cannot create {}: {}",
                    self.ctx.layout.output_dir.display(),
                    e
                ),
            )
        })?;

        self.ctx.logger.info(&format!(
            "Job '{}': {} at {} fps, max {} frames",
            job_name,
            self.ctx.job.video.display(),
            self.ctx.job.sample_rate,
            self.ctx.job.max_frames
        ));

        // Provisioning: host packages, toolchain, accelerators
        self.transition(PipelineState::Provisioning, report);
        if let Some(failure) = self.install_system_deps() {
            report.best_effort_failures.push(failure);
        }
        let toolchain = self
            .provision()
            .map_err(|source| PipelineError::Provisioning {
                job_name: job_name.clone(),
                source,
            })?;
        report.toolchain = Some(toolchain.executable.clone());

        let accelerators = Arc::new(self.detect_accelerators());
        report.accelerators = (*accelerators).clone();

        self.transition(PipelineState::FrameExtraction, report);
        let frames = self
            .sample_frames()
            .map_err(|source| PipelineError::Extraction {
                job_name: job_name.clone(),
                source,
            })?;
        report.frame_count = frames.len();

        // Frozen for every stage from here on
        let inputs = StageInputs {
            toolchain,
            accelerators: Arc::clone(&accelerators),
            frames,
        };
        let runner = StageRunner::new(accelerators, thread_hint(logical_cpus()));

        let steps = std::mem::take(&mut self.steps);
        for step in &steps {
            self.run_step(step.as_ref(), &inputs, &runner, report)?;
        }
        self.steps = steps;

        self.transition(PipelineState::ArtifactCollection, report);
        let collection = ArtifactCollector::for_layout(&self.ctx.layout, TEXTURING_NODE).collect();
        if collection.is_warning() {
            self.ctx.logger.warn(&collection.to_string());
        } else {
            self.ctx.logger.success(&collection.to_string());
        }
        report.record_collection(&collection);

        Ok(collection)
    }

    fn run_step(
        &mut self,
        step: &dyn PipelineStep,
        inputs: &StageInputs,
        runner: &StageRunner,
        report: &mut PipelineReport,
    ) -> PipelineResult<()> {
        let name = step.name();
        let state = step.state();
        self.transition(state, report);
        self.ctx.logger.info(step.description());

        self.ctx
            .logger
            .debug(&format!("Validating input for '{}'", name));
        if let Err(e) = step.validate_input(&self.ctx, inputs) {
            self.ctx
                .logger
                .error(&format!("Input validation failed: {}", e));
            return Err(PipelineError::step_failed(
                self.ctx.job_name(),
                name,
                state,
                e,
            ));
        }

        let command = step.command(&self.ctx, inputs);
        let mut result = runner.run(name, &command, &self.ctx.logger);

        if result.succeeded() {
            self.ctx
                .logger
                .debug(&format!("Validating output for '{}'", name));
            if let Err(e) = step.validate_output(&self.ctx) {
                // Exit 0 without the declared outputs counts as a failed run
                self.ctx
                    .logger
                    .error(&format!("Output validation failed: {}", e));
                result = result.fail_with(1, e.to_string());
            }
        }

        report.stages.push(StageRecord::from(&result));

        if result.succeeded() {
            self.ctx.logger.success(&format!(
                "{} completed in {:.1}s",
                name,
                result.duration.as_secs_f64()
            ));
            return Ok(());
        }

        match step.criticality() {
            Criticality::BestEffort => {
                let failure = BestEffortFailure {
                    stage: name.to_string(),
                    exit_code: result.exit_code,
                };
                self.ctx.logger.warn(&failure.to_string());
                tracing::warn!("{}", failure);
                report.best_effort_failures.push(failure);
                Ok(())
            }
            Criticality::Fatal => {
                self.ctx.logger.error(&format!(
                    "{} failed with exit code {}",
                    name, result.exit_code
                ));
                self.ctx.logger.show_tail(name);
                Err(PipelineError::StageFailed {
                    job_name: self.ctx.job_name().to_string(),
                    stage: name.to_string(),
                    state,
                    exit_code: result.exit_code,
                    diagnostics: result.diagnostics,
                })
            }
        }
    }

    /// Best-effort host package installation. Returns the failure, if any.
    fn install_system_deps(&self) -> Option<BestEffortFailure> {
        let settings = &self.ctx.settings.provisioning;
        if !settings.install_system_deps {
            return None;
        }

        let deps = SystemDependencies::new(settings.clone());
        self.ctx.logger.section(SYSTEM_DEPENDENCIES_STAGE);
        self.ctx.logger.command(&deps.install_command_line());

        let logger = &self.ctx.logger;
        match deps.ensure(|line, is_stderr| logger.output_line(line, is_stderr)) {
            DependencyStatus::Present => {
                logger.info("System dependencies already present");
                None
            }
            DependencyStatus::Installed => {
                logger.success("System dependencies installed");
                None
            }
            DependencyStatus::Missing { probe } => {
                logger.warn(&format!("'{}' is not available", probe));
                None
            }
            DependencyStatus::InstallFailed { exit_code, message } => {
                let failure = BestEffortFailure {
                    stage: SYSTEM_DEPENDENCIES_STAGE.to_string(),
                    exit_code,
                };
                logger.warn(&format!("{}: {}", failure, message));
                Some(failure)
            }
        }
    }

    fn provision(&self) -> Result<Toolchain, ProvisioningError> {
        let settings = self.ctx.settings.toolchain.clone();
        let target = settings.install_dir_or(&self.ctx.job.work_dir);
        let provisioner = ToolchainProvisioner::with_fetcher(settings, &*self.fetcher);

        let state_name = PipelineState::Provisioning.to_string();
        let percent = PipelineState::Provisioning.percent();
        let result = provisioner.ensure(&target, |progress| match progress {
            ProvisionProgress::Downloading { percent: p } => self.ctx.report_progress(
                &state_name,
                percent,
                &format!("Downloading toolchain {}%", p),
            ),
            ProvisionProgress::Verifying => {
                self.ctx
                    .report_progress(&state_name, percent, "Verifying toolchain archive")
            }
            ProvisionProgress::Extracting => {
                self.ctx
                    .report_progress(&state_name, percent, "Extracting toolchain")
            }
            ProvisionProgress::Ready => {}
        });

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.ctx.logger.error(&e.to_string());
                return Err(e);
            }
        };

        match &result {
            ProvisioningResult::AlreadyPresent(toolchain) => self.ctx.logger.info(&format!(
                "Toolchain present: {}",
                toolchain.executable.display()
            )),
            ProvisioningResult::Installed {
                toolchain,
                downloaded,
            } => self.ctx.logger.success(&format!(
                "Toolchain installed{}: {}",
                if *downloaded { "" } else { " from existing archive" },
                toolchain.executable.display()
            )),
        }

        Ok(result.into_toolchain())
    }

    fn detect_accelerators(&self) -> AcceleratorSet {
        let settings = &self.ctx.settings.accelerators;
        let detector = ResourceDetector::new(&settings.detect_program);
        let set = detector.resolve(&self.ctx.job.accelerators);
        if set.is_empty() {
            self.ctx
                .logger
                .info("No accelerators assigned, running CPU-only");
        } else {
            self.ctx
                .logger
                .info(&format!("Accelerators: {}", set));
        }
        set
    }

    fn sample_frames(&self) -> Result<FrameCorpus, crate::frames::ExtractionError> {
        let sampling = &self.ctx.settings.sampling;
        let sampler = FrameSampler::new(&self.ctx.settings.tools.ffmpeg, sampling.frame_format);
        let logger = &self.ctx.logger;

        let args = sampler.build_args(
            &self.ctx.job.video,
            &self.ctx.layout.frames_dir,
            self.ctx.job.sample_rate,
        );
        logger.command(&crate::process::display_command(
            &self.ctx.settings.tools.ffmpeg,
            &args,
        ));
        logger.clear_tail();

        let outcome = sampler
            .sample(
                &self.ctx.job.video,
                &self.ctx.layout.frames_dir,
                self.ctx.job.sample_rate,
                self.ctx.job.frame_cap(),
                |line, is_stderr| logger.output_line(line, is_stderr),
            )
            .inspect_err(|e| {
                logger.error(&e.to_string());
                logger.show_tail("ffmpeg");
            })?;

        if outcome.removed > 0 {
            logger.info(&format!(
                "Extracted {} frames, kept the first {}",
                outcome.raw_count,
                outcome.corpus.len()
            ));
        } else {
            logger.success(&format!("Extracted {} frames", outcome.corpus.len()));
        }

        match sampling.convert_to {
            Some(target) if target != sampler.format() => {
                let dest = self.ctx.layout.converted_frames_dir(target);
                let converted = convert_corpus(&outcome.corpus, &dest, target)?;
                logger.success(&format!(
                    "Converted {} frames to {} in {}",
                    converted.len(),
                    target.extension(),
                    dest.display()
                ));
                Ok(converted)
            }
            _ => Ok(outcome.corpus),
        }
    }

    fn transition(&mut self, next: PipelineState, report: &mut PipelineReport) {
        tracing::debug!("{} -> {}", self.state, next);
        self.state = next;
        report.state = next;

        if !next.is_terminal() {
            self.ctx.logger.phase(&next.to_string());
        }
        self.ctx
            .report_progress(&next.to_string(), next.percent(), &format!("Entering {}", next));
    }

    fn write_report(&self, report: &PipelineReport) {
        let path = &self.ctx.layout.report_file;
        let written = serde_json::to_string_pretty(report)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                fs::write(path, json).map_err(|e| e.to_string())
            });

        match written {
            Ok(()) => self
                .ctx
                .logger
                .debug(&format!("Run manifest written to {}", path.display())),
            Err(e) => {
                tracing::warn!("Failed to write run manifest {}: {}", path.display(), e);
                self.ctx
                    .logger
                    .warn(&format!("Failed to write run manifest: {}", e));
            }
        }
    }
}

/// The standard reconstruction stages in pipeline order.
pub fn standard_steps() -> Vec<Box<dyn PipelineStep>> {
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

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    /// The manifest that was written to disk.
    pub report: PipelineReport,
    /// What the artifact collector found.
    pub collection: CollectionOutcome,
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::logging::{JobLogger, LogConfig};
    use crate::models::{AcceleratorPolicy, Job};
    use crate::orchestrator::errors::{StepError, StepResult};
    use crate::orchestrator::stage::StageCommand;
    use crate::orchestrator::StageStatus;
    use crate::test_support::{failing_ffmpeg, fake_ffmpeg, write_script};
    use std::path::{Path, PathBuf};

    /// Refuses to download; provisioning in these tests must be a
    /// presence check.
    struct NoNetwork;

    impl ArchiveFetcher for NoNetwork {
        fn fetch(
            &self,
            url: &str,
            _dest: &Path,
            _progress: &dyn Fn(u8),
        ) -> Result<u64, ProvisioningError> {
            Err(ProvisioningError::Download {
                url: url.to_string(),
                message: "network disabled in tests".to_string(),
            })
        }
    }

    /// Behavior of the scripted batch runner.
    #[derive(Default)]
    struct FakeToolchain<'a> {
        /// Exit with this code when asked for this node.
        fail_at: Option<(&'a str, i32)>,
        /// Exit 0 without creating this node's cache directory.
        no_output_at: Option<&'a str>,
        /// Write mesh files into the Texturing output.
        texture: bool,
    }

    impl FakeToolchain<'_> {
        /// Body of a batch runner that logs each requested node to
        /// `<dir>/invocations.log` and its environment to `env_<node>.txt`.
        fn script(&self, dir: &Path) -> String {
            let (fail_node, fail_code) = self.fail_at.unwrap_or(("", 0));
            format!(
                r#"cache=""
node=""
while [ $# -gt 0 ]; do
  case "$1" in
    --cache) cache="$2"; shift 2 ;;
    --toNode) node="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "$node" >> "{dir}/invocations.log"
env > "{dir}/env_$node.txt"
echo "computing $node"
if [ "$node" = "{fail_node}" ]; then
  echo "fatal error in $node" >&2
  exit {fail_code}
fi
if [ "$node" != "{no_output}" ]; then
  mkdir -p "$cache/$node/0a1b2c"
fi
if [ "$node" = "Texturing" ] && [ "{texture}" = "yes" ]; then
  out="$cache/Texturing/0a1b2c"
  echo "v 0 0 0" > "$out/texturedMesh.obj"
  echo "newmtl m" > "$out/texturedMesh.mtl"
  : > "$out/texture_1001.png"
fi
exit 0"#,
                dir = dir.display(),
                no_output = self.no_output_at.unwrap_or(""),
                texture = if self.texture { "yes" } else { "no" },
            )
        }

        /// Install the runner where the provisioner will find it.
        fn install(&self, dir: &Path) -> PathBuf {
            write_script(
                &dir.join("tools/Meshroom-2025.1.0-Linux/aliceVision/bin/meshroom_batch"),
                &self.script(dir),
            )
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        settings: Settings,
        job: Job,
    }

    impl Fixture {
        fn new(frame_count: usize) -> Self {
            crate::logging::init_test_tracing();
            let dir = tempfile::tempdir().unwrap();
            let video = dir.path().join("IMG_2604.MOV");
            fs::write(&video, b"video").unwrap();

            let mut settings = Settings::default();
            settings.tools.ffmpeg = fake_ffmpeg(dir.path(), frame_count)
                .to_string_lossy()
                .into_owned();
            settings.toolchain.install_dir = dir.path().join("tools").to_string_lossy().into_owned();
            settings.accelerators.detect_program = "/nonexistent/nvidia-smi".to_string();

            let job = Job::new(&video, dir.path().join("work")).with_max_frames(300);
            Self { dir, settings, job }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn pipeline(&self) -> ReconstructionPipeline {
            self.pipeline_with(standard_steps())
        }

        fn pipeline_with(&self, steps: Vec<Box<dyn PipelineStep>>) -> ReconstructionPipeline {
            let layout = Context::layout_for(&self.job, &self.settings);
            let logger = JobLogger::new(&self.job.name, &layout.logs_dir, LogConfig::default(), None)
                .unwrap();
            let ctx = Context::new(self.job.clone(), self.settings.clone(), Arc::new(logger));
            ReconstructionPipeline::with_steps(ctx, steps).with_fetcher(NoNetwork)
        }

        fn invocations(&self) -> Vec<String> {
            fs::read_to_string(self.path().join("invocations.log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn report(&self) -> serde_json::Value {
            let path = self.path().join("work/output/pipeline_report.json");
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
        }
    }

    const ALL_NODES: [&str; 7] = [
        "FeatureExtraction",
        "FeatureMatching",
        "StructureFromMotion",
        "PrepareDenseScene",
        "DepthMapFilter",
        "MeshFiltering",
        "Texturing",
    ];

    #[test]
    fn standard_pipeline_has_seven_stages() {
        let fx = Fixture::new(1);
        assert_eq!(
            fx.pipeline().step_names(),
            vec![
                "FeatureExtraction",
                "Matching",
                "SparseReconstruction",
                "Undistortion",
                "DenseReconstruction",
                "Meshing",
                "Texturing"
            ]
        );
        assert_eq!(fx.pipeline().state(), PipelineState::Created);
    }

    #[test]
    fn cpu_only_run_completes_and_collects_artifacts() {
        let fx = Fixture::new(120);
        FakeToolchain {
            texture: true,
            ..Default::default()
        }
        .install(fx.path());

        let run = fx.pipeline().run().unwrap();

        assert_eq!(run.report.state, PipelineState::Completed);
        assert_eq!(run.report.frame_count, 120);
        assert!(run.report.accelerators.is_empty());
        assert_eq!(fx.invocations(), ALL_NODES);
        assert!(run
            .report
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Succeeded));

        assert_eq!(run.collection.artifacts().len(), 3);
        let final_dir = fx.path().join("work/output/final");
        assert!(final_dir.join("texturedMesh.obj").exists());
        assert!(final_dir.join("texturedMesh.mtl").exists());
        assert!(final_dir.join("texture_1001.png").exists());

        // No accelerator ids reach the stages
        let env = fs::read_to_string(fx.path().join("env_DepthMapFilter.txt")).unwrap();
        assert!(!env.contains("CUDA_VISIBLE_DEVICES="));
        assert!(!env.contains("ALICEVISION_CUDA_DEVICES="));
        assert!(env.contains("OMP_NUM_THREADS="));

        let report = fx.report();
        assert_eq!(report["state"], "Completed");
        assert_eq!(report["artifacts"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn explicit_accelerators_reach_every_stage() {
        let mut fx = Fixture::new(3);
        fx.job = fx
            .job
            .clone()
            .with_accelerators(AcceleratorPolicy::Explicit(vec!["0".into(), "1".into()]));
        FakeToolchain::default().install(fx.path());

        fx.pipeline().run().unwrap();

        for node in ALL_NODES {
            let env = fs::read_to_string(fx.path().join(format!("env_{}.txt", node))).unwrap();
            assert!(env.contains("CUDA_VISIBLE_DEVICES=0,1"), "{}", node);
            assert!(env.contains("ALICEVISION_CUDA_DEVICES=0,1"), "{}", node);
        }
    }

    #[test]
    fn fatal_stage_failure_stops_the_pipeline() {
        let fx = Fixture::new(10);
        FakeToolchain {
            fail_at: Some(("StructureFromMotion", 3)),
            ..Default::default()
        }
        .install(fx.path());

        let err = fx.pipeline().run().unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.failed_state(), PipelineState::SparseReconstruction);
        assert_eq!(err.stage_name(), "SparseReconstruction");
        assert!(err
            .diagnostics()
            .contains(&"fatal error in StructureFromMotion".to_string()));
        assert_eq!(
            fx.invocations(),
            ["FeatureExtraction", "FeatureMatching", "StructureFromMotion"]
        );

        let report = fx.report();
        assert_eq!(report["state"], "Failed");
        assert_eq!(report["failure"]["exit_code"], 3);
        assert_eq!(report["failure"]["state"], "SparseReconstruction");
        assert!(!fx.path().join("work/output/final").exists());

        // Nothing is rolled back
        assert!(fx.path().join("work/frames/frame_000010.png").exists());
    }

    #[test]
    fn missing_texture_output_still_completes() {
        let fx = Fixture::new(5);
        FakeToolchain::default().install(fx.path());

        let run = fx.pipeline().run().unwrap();

        assert_eq!(run.report.state, PipelineState::Completed);
        assert!(run.collection.is_warning());
        assert!(matches!(run.collection, CollectionOutcome::NotFound { .. }));
        assert!(run.report.collection_warning.is_some());
        assert!(run.report.artifacts.is_empty());
    }

    #[test]
    fn texturing_without_node_dir_is_a_collection_warning() {
        let fx = Fixture::new(5);
        FakeToolchain {
            no_output_at: Some("Texturing"),
            ..Default::default()
        }
        .install(fx.path());

        let run = fx.pipeline().run().unwrap();

        assert_eq!(run.report.state, PipelineState::Completed);
        assert!(matches!(run.collection, CollectionOutcome::NotFound { .. }));
        assert!(run.report.failure.is_none());
        assert_eq!(fx.invocations().last().map(String::as_str), Some("Texturing"));
        assert!(!fx.path().join("work/output/MeshroomCache/Texturing").exists());
    }

    #[test]
    fn zero_exit_without_outputs_fails_with_exit_one() {
        let fx = Fixture::new(5);
        FakeToolchain {
            no_output_at: Some("DepthMapFilter"),
            ..Default::default()
        }
        .install(fx.path());

        let err = fx.pipeline().run().unwrap_err();

        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.failed_state(), PipelineState::DenseReconstruction);
        assert_eq!(fx.invocations().last().map(String::as_str), Some("DepthMapFilter"));
    }

    #[test]
    fn frame_cap_applies_before_reconstruction() {
        let fx = Fixture::new(500);
        FakeToolchain::default().install(fx.path());

        let run = fx.pipeline().run().unwrap();

        assert_eq!(run.report.frame_count, 300);
        assert!(fx.path().join("work/frames/frame_000300.png").exists());
        assert!(!fx.path().join("work/frames/frame_000301.png").exists());
    }

    #[test]
    fn extraction_failure_is_fatal_before_any_stage() {
        let mut fx = Fixture::new(1);
        fx.settings.tools.ffmpeg = failing_ffmpeg(fx.path(), 1).to_string_lossy().into_owned();
        FakeToolchain::default().install(fx.path());

        let err = fx.pipeline().run().unwrap_err();

        assert!(matches!(err, PipelineError::Extraction { .. }));
        assert_eq!(err.failed_state(), PipelineState::FrameExtraction);
        assert!(fx.invocations().is_empty());
    }

    #[test]
    fn missing_toolchain_without_network_fails_provisioning() {
        let fx = Fixture::new(1);

        let err = fx.pipeline().run().unwrap_err();

        assert_eq!(err.failed_state(), PipelineState::Provisioning);
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("Meshroom-2025.1.0-Linux.tar.gz"));
    }

    #[test]
    fn missing_video_is_an_invalid_job() {
        let mut fx = Fixture::new(1);
        fx.job.video = fx.path().join("absent.mov");

        let err = fx.pipeline().run().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidJob { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    /// A stage that always fails, with configurable criticality.
    struct FlakyStep {
        criticality: Criticality,
    }

    impl PipelineStep for FlakyStep {
        fn name(&self) -> &str {
            "Flaky"
        }

        fn state(&self) -> PipelineState {
            PipelineState::FeatureExtraction
        }

        fn criticality(&self) -> Criticality {
            self.criticality
        }

        fn validate_input(&self, _ctx: &Context, _inputs: &StageInputs) -> StepResult<()> {
            Ok(())
        }

        fn command(&self, _ctx: &Context, _inputs: &StageInputs) -> StageCommand {
            StageCommand::new("/bin/sh").args(["-c", "exit 5"])
        }

        fn validate_output(&self, _ctx: &Context) -> StepResult<()> {
            Err(StepError::invalid_output("never reached"))
        }
    }

    #[test]
    fn best_effort_failure_does_not_fail_the_job() {
        let fx = Fixture::new(2);
        FakeToolchain::default().install(fx.path());

        let run = fx
            .pipeline_with(vec![Box::new(FlakyStep {
                criticality: Criticality::BestEffort,
            })])
            .run()
            .unwrap();

        assert_eq!(run.report.state, PipelineState::Completed);
        assert_eq!(
            run.report.best_effort_failures,
            vec![BestEffortFailure {
                stage: "Flaky".into(),
                exit_code: 5
            }]
        );
    }

    #[test]
    fn fatal_custom_stage_fails_the_job() {
        let fx = Fixture::new(2);
        FakeToolchain::default().install(fx.path());

        let err = fx
            .pipeline_with(vec![Box::new(FlakyStep {
                criticality: Criticality::Fatal,
            })])
            .run()
            .unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn failed_system_dependency_install_is_best_effort() {
        let mut fx = Fixture::new(2);
        FakeToolchain::default().install(fx.path());
        let installer = write_script(&fx.path().join("installer"), "exit 100");
        fx.settings.provisioning.install_system_deps = true;
        fx.settings.provisioning.probe_program = "/nonexistent/ffmpeg".to_string();
        fx.settings.provisioning.install_command = vec![installer.to_string_lossy().into_owned()];

        let run = fx.pipeline().run().unwrap();

        assert_eq!(run.report.best_effort_failures.len(), 1);
        assert_eq!(run.report.best_effort_failures[0].stage, "SystemDependencies");
        assert_eq!(run.report.best_effort_failures[0].exit_code, 100);
    }

    #[test]
    fn progress_reaches_completed() {
        let fx = Fixture::new(2);
        FakeToolchain::default().install(fx.path());

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let layout = Context::layout_for(&fx.job, &fx.settings);
        let logger =
            JobLogger::new(&fx.job.name, &layout.logs_dir, LogConfig::default(), None).unwrap();
        let ctx = Context::new(fx.job.clone(), fx.settings.clone(), Arc::new(logger))
            .with_progress_callback(Box::new(move |state: &str, percent: u32, _: &str| {
                sink.lock().push((state.to_string(), percent));
            }));

        ReconstructionPipeline::new(ctx)
            .with_fetcher(NoNetwork)
            .run()
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.first().map(|s| s.0.as_str()), Some("Provisioning"));
        assert_eq!(seen.last(), Some(&("Completed".to_string(), 100)));
    }
}
