//! Runs one stage's external command and classifies the outcome.

use std::fmt;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::logging::JobLogger;
use crate::process::{self, EXIT_SPAWN_FAILED};
use crate::resources::{AcceleratorSet, ACCELERATOR_ENV_VARS, THREAD_HINT_ENV_VAR};

use super::stage::StageCommand;

/// Whether a stage's command succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
}

/// Outcome of one stage run.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    /// Process exit code; 127 when it could not be started, 128+N when
    /// killed by signal N.
    pub exit_code: i32,
    /// Combined stdout/stderr lines in arrival order.
    pub diagnostics: Vec<String>,
    pub duration: Duration,
}

impl StageResult {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// Mark a zero-exit run as failed because its outputs are missing.
    pub(crate) fn fail_with(mut self, exit_code: i32, message: String) -> Self {
        self.status = StageStatus::Failed;
        self.exit_code = exit_code;
        self.diagnostics.push(message);
        self
    }
}

/// A best-effort stage that failed. Logged and recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestEffortFailure {
    pub stage: String,
    pub exit_code: i32,
}

impl fmt::Display for BestEffortFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "best-effort stage '{}' failed with exit code {}",
            self.stage, self.exit_code
        )
    }
}

/// Executes stage commands with the job's accelerator assignment.
///
/// Never retries.
#[derive(Debug, Clone)]
pub struct StageRunner {
    accelerators: Arc<AcceleratorSet>,
    thread_hint: usize,
}

impl StageRunner {
    pub fn new(accelerators: Arc<AcceleratorSet>, thread_hint: usize) -> Self {
        Self {
            accelerators,
            thread_hint: thread_hint.max(1),
        }
    }

    /// The fully resolved process for a stage command.
    pub fn build_command(&self, stage_cmd: &StageCommand) -> Command {
        let mut cmd = Command::new(&stage_cmd.program);
        cmd.args(&stage_cmd.args);
        cmd.envs(&stage_cmd.env);

        let accel_env = self.accelerators.env_vars();
        if accel_env.is_empty() {
            // CPU-only: an inherited device list must not leak through
            for name in ACCELERATOR_ENV_VARS {
                cmd.env_remove(name);
            }
        } else {
            cmd.envs(accel_env);
        }
        cmd.env(THREAD_HINT_ENV_VAR, self.thread_hint.to_string());
        cmd
    }

    /// Run a stage to completion, streaming its output into `logger`.
    pub fn run(&self, stage: &str, stage_cmd: &StageCommand, logger: &JobLogger) -> StageResult {
        logger.command(&stage_cmd.display());
        logger.command_pretty(&stage_cmd.program.to_string_lossy(), &stage_cmd.args);
        logger.clear_tail();

        let started = Instant::now();
        let mut cmd = self.build_command(stage_cmd);
        let outcome = process::run_streaming(&mut cmd, |line, is_stderr| {
            logger.output_line(line, is_stderr);
        });
        let duration = started.elapsed();

        let (exit_code, diagnostics) = match outcome {
            Ok(output) => (output.exit_code, output.lines),
            Err(e) => {
                let message = format!(
                    "failed to start {}: {}",
                    stage_cmd.program.display(),
                    e
                );
                logger.error(&message);
                (EXIT_SPAWN_FAILED, vec![message])
            }
        };

        let status = if exit_code == 0 {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };

        tracing::debug!(
            "Stage '{}' finished with exit code {} in {:.1}s",
            stage,
            exit_code,
            duration.as_secs_f64()
        );

        StageResult {
            stage: stage.to_string(),
            status,
            exit_code,
            diagnostics,
            duration,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use crate::test_support::write_script;
    use std::fs;

    fn logger(dir: &std::path::Path) -> JobLogger {
        JobLogger::new("runner_test", dir.join("logs"), LogConfig::default(), None).unwrap()
    }

    /// Script that dumps its environment to `env.txt` next to itself.
    fn env_dumper(dir: &std::path::Path) -> std::path::PathBuf {
        write_script(
            &dir.join("tool"),
            &format!("env > '{}'\necho done", dir.join("env.txt").display()),
        )
    }

    fn env_lines(dir: &std::path::Path) -> Vec<String> {
        fs::read_to_string(dir.join("env.txt"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn accelerators_and_thread_hint_are_exported() {
        let dir = tempfile::tempdir().unwrap();
        let tool = env_dumper(dir.path());
        let runner = StageRunner::new(
            Arc::new(AcceleratorSet::new(vec!["0".into(), "1".into()])),
            7,
        );

        let result = runner.run("Probe", &StageCommand::new(&tool), &logger(dir.path()));
        assert!(result.succeeded());
        assert_eq!(result.diagnostics, vec!["done"]);

        let env = env_lines(dir.path());
        assert!(env.contains(&"CUDA_VISIBLE_DEVICES=0,1".to_string()));
        assert!(env.contains(&"ALICEVISION_CUDA_DEVICES=0,1".to_string()));
        assert!(env.contains(&"OMP_NUM_THREADS=7".to_string()));
    }

    #[test]
    fn cpu_only_removes_inherited_device_vars() {
        let dir = tempfile::tempdir().unwrap();
        let tool = env_dumper(dir.path());
        let runner = StageRunner::new(Arc::new(AcceleratorSet::cpu_only()), 1);

        // Simulate a device list inherited from the parent environment
        let stage_cmd = StageCommand::new(&tool).env("CUDA_VISIBLE_DEVICES", "3");
        let result = runner.run("Probe", &stage_cmd, &logger(dir.path()));
        assert!(result.succeeded());

        let env = env_lines(dir.path());
        assert!(!env.iter().any(|l| l.starts_with("CUDA_VISIBLE_DEVICES=")));
        assert!(!env.iter().any(|l| l.starts_with("ALICEVISION_CUDA_DEVICES=")));
        assert!(env.contains(&"OMP_NUM_THREADS=1".to_string()));
    }

    #[test]
    fn nonzero_exit_is_failed_with_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_script(&dir.path().join("tool"), "echo working\necho 'bad input' >&2\nexit 4");
        let runner = StageRunner::new(Arc::new(AcceleratorSet::cpu_only()), 1);
        let log = logger(dir.path());

        let result = runner.run("Broken", &StageCommand::new(&tool), &log);
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.exit_code, 4);
        assert_eq!(result.diagnostics.len(), 2);
        assert!(result.diagnostics.contains(&"bad input".to_string()));
        assert_eq!(log.get_tail().len(), 2);
    }

    #[test]
    fn spawn_failure_is_exit_127() {
        let dir = tempfile::tempdir().unwrap();
        let runner = StageRunner::new(Arc::new(AcceleratorSet::cpu_only()), 1);
        let result = runner.run(
            "Missing",
            &StageCommand::new("/nonexistent/meshroom_batch"),
            &logger(dir.path()),
        );
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.exit_code, 127);
        assert!(result.diagnostics[0].contains("failed to start"));
    }

    #[test]
    fn signal_is_128_plus_n() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_script(&dir.path().join("tool"), "kill -15 $$");
        let runner = StageRunner::new(Arc::new(AcceleratorSet::cpu_only()), 1);
        let result = runner.run("Killed", &StageCommand::new(&tool), &logger(dir.path()));
        assert_eq!(result.exit_code, 143);
    }

    #[test]
    fn best_effort_failure_displays_stage() {
        let failure = BestEffortFailure {
            stage: "SystemDependencies".into(),
            exit_code: 100,
        };
        assert_eq!(
            failure.to_string(),
            "best-effort stage 'SystemDependencies' failed with exit code 100"
        );
    }
}
