//! video-to-mesh - command line entry point
//!
//! Loads configuration, applies flag overrides, sets up logging and runs a
//! single reconstruction job to completion.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mesh_core::config::{ConfigManager, Settings};
use mesh_core::logging::{env_filter, ConsoleCallback, JobLogger, LogLevel};
use mesh_core::models::{AcceleratorPolicy, Job, SamplingProfile};
use mesh_core::orchestrator::{create_standard_pipeline, Context, PipelineRunResult};

/// Turn a handheld video into a textured 3D mesh
#[derive(Parser, Debug)]
#[command(name = "video-to-mesh")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input video file
    #[arg(long)]
    video: PathBuf,

    /// Working directory for frames, toolchain and outputs
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Frames sampled per second of video (overrides the profile)
    #[arg(long)]
    fps: Option<f64>,

    /// Sampling profile: standard (4 fps) or dense (10 fps)
    #[arg(long)]
    profile: Option<SamplingProfile>,

    /// Keep at most this many frames; 0 keeps all
    #[arg(long)]
    max_frames: Option<usize>,

    /// Accelerators: "auto" or a comma separated id list
    #[arg(long)]
    gpus: Option<AcceleratorPolicy>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Try to install missing system packages before running
    #[arg(long)]
    install_deps: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Default config path: the platform config dir, or `.config/settings.toml`
/// when no home directory is known.
fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "video-to-mesh")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from(".config").join("settings.toml"))
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config_manager = ConfigManager::new(&config_path);
    if args.config.is_some() {
        config_manager
            .load()
            .with_context(|| format!("loading config {}", config_path.display()))?;
    } else if let Err(e) = config_manager.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let mut settings = config_manager.into_settings();
    apply_overrides(&mut settings, &args);

    let job = build_job(&settings, &args);
    let layout = Context::layout_for(&job, &settings);

    let _log_guard = init_tracing(settings.logging.level, &layout.logs_dir)?;

    tracing::info!("video-to-mesh starting");
    tracing::info!("Config: {}", config_path.display());
    tracing::info!("Core version: {}", mesh_core::version());

    let console: ConsoleCallback = Box::new(|line: &str| println!("{}", line));
    let logger = JobLogger::new(
        &job.name,
        &layout.logs_dir,
        settings.logging.to_log_config(),
        Some(console),
    )
    .with_context(|| format!("creating job log in {}", layout.logs_dir.display()))?;
    let log_path = logger.log_path().to_path_buf();

    let ctx = Context::new(job, settings, Arc::new(logger));
    let report_path = ctx.layout.report_file.clone();

    let code = match create_standard_pipeline(ctx).run() {
        Ok(run) => {
            print_summary(&run, &report_path, &log_path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let exit_code = e.exit_code();
            tracing::error!("{}", e);
            eprintln!();
            eprintln!("Reconstruction failed in {}: {}", e.failed_state(), e);
            eprintln!("Exit code: {}", exit_code);
            eprintln!("Log:       {}", log_path.display());
            eprintln!("Manifest:  {}", report_path.display());
            ExitCode::from(exit_code.clamp(1, 255) as u8)
        }
    };

    Ok(code)
}

/// Fold command line flags into the loaded settings.
fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(workdir) = &args.workdir {
        settings.paths.work_dir = workdir.to_string_lossy().into_owned();
    }
    if let Some(profile) = args.profile {
        settings.sampling.profile = profile;
        // A profile on the command line beats an fps from the config file
        settings.sampling.fps = None;
    }
    if let Some(fps) = args.fps {
        settings.sampling.fps = Some(fps);
    }
    if let Some(max_frames) = args.max_frames {
        settings.sampling.max_frames = max_frames;
    }
    if let Some(policy) = &args.gpus {
        settings.accelerators.policy = policy.clone();
    }
    if args.install_deps {
        settings.provisioning.install_system_deps = true;
    }
    if args.verbose {
        settings.logging.level = LogLevel::Debug;
        settings.logging.compact = false;
    }
}

fn build_job(settings: &Settings, args: &Args) -> Job {
    Job::new(&args.video, &settings.paths.work_dir)
        .with_sample_rate(settings.sampling.effective_fps())
        .with_max_frames(settings.sampling.max_frames)
        .with_accelerators(settings.accelerators.policy.clone())
}

/// Stderr output plus a non-blocking application log next to the job logs.
fn init_tracing(level: LogLevel, logs_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("creating log directory {}", logs_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(logs_dir, "video-to-mesh.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

fn print_summary(run: &PipelineRunResult, report_path: &Path, log_path: &Path) {
    let report = &run.report;

    println!();
    println!("Reconstruction completed: {}", report.job.name);
    println!("  Frames:       {}", report.frame_count);
    println!("  Accelerators: {}", report.accelerators);
    for stage in &report.stages {
        println!(
            "  {:<22} exit {:>3}  {:>8.1}s",
            stage.stage, stage.exit_code, stage.duration_secs
        );
    }
    for failure in &report.best_effort_failures {
        println!("  Warning: {}", failure);
    }

    if run.collection.is_warning() {
        println!("  Warning: {}", run.collection);
    } else {
        println!("  Artifacts:");
        for artifact in run.collection.artifacts() {
            println!("    {}", artifact.path.display());
        }
    }
    println!("  Manifest:     {}", report_path.display());
    println!("  Log:          {}", log_path.display());
}
