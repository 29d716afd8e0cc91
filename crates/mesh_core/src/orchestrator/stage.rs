//! Reconstruction stage trait and command descriptor.
//!
//! All reconstruction stages implement [`PipelineStep`], providing a
//! consistent interface for validation and command construction. Stages
//! never spawn processes themselves; they describe one external invocation
//! as a [`StageCommand`] and the [`StageRunner`](super::StageRunner)
//! executes it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::process;

use super::errors::{StepError, StepResult};
use super::types::{Context, PipelineState, StageInputs};

/// How a failed stage affects the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// A failure ends the job in `Failed`.
    #[default]
    Fatal,
    /// A failure is logged and the pipeline moves on.
    BestEffort,
}

/// One external-tool invocation: program, ordered arguments, environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment entries, applied on top of the inherited one.
    pub env: BTreeMap<String, String>,
}

impl StageCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a flag followed by its value.
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append a flag followed by a path value.
    pub fn path_flag(self, flag: &str, path: &Path) -> Self {
        self.flag(flag, path.to_string_lossy().into_owned())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-style rendering for logs.
    pub fn display(&self) -> String {
        process::display_command(&self.program.to_string_lossy(), &self.args)
    }
}

/// Trait for reconstruction stages.
///
/// The pipeline calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before the tool runs
/// 2. `command` - Describe the tool invocation
/// 3. `validate_output` - Verify the tool produced its outputs (only after
///    a zero exit)
pub trait PipelineStep: Send + Sync {
    /// Get the stage name (for logging and error context).
    fn name(&self) -> &str;

    /// The pipeline state this stage runs in.
    fn state(&self) -> PipelineState;

    /// Whether a failure ends the job.
    fn criticality(&self) -> Criticality {
        Criticality::Fatal
    }

    /// Validate inputs before execution.
    fn validate_input(&self, ctx: &Context, inputs: &StageInputs) -> StepResult<()>;

    /// Build the invocation for this stage.
    fn command(&self, ctx: &Context, inputs: &StageInputs) -> StageCommand;

    /// Validate outputs after a zero exit.
    fn validate_output(&self, ctx: &Context) -> StepResult<()>;

    /// Human-readable description of what this stage does.
    fn description(&self) -> &str {
        self.name()
    }
}

/// Check that a directory exists, for stage pre- and post-conditions.
pub(crate) fn require_dir(path: &Path, what: &str) -> Result<(), String> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(format!("{} not found at {}", what, path.display()))
    }
}

/// Output check shared by stages that write a cache node directory.
pub(crate) fn require_output_dir(path: &Path, node: &str) -> StepResult<()> {
    require_dir(path, &format!("{} output", node)).map_err(StepError::invalid_output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_builder_keeps_argument_order() {
        let cmd = StageCommand::new("/opt/Meshroom/meshroom_batch")
            .flag("--input", "/w/frames")
            .arg("--toNode")
            .arg("FeatureExtraction")
            .args(["--paramOverrides", "A=1"])
            .env("AV_LOG", "info");

        assert_eq!(
            cmd.args,
            vec![
                "--input",
                "/w/frames",
                "--toNode",
                "FeatureExtraction",
                "--paramOverrides",
                "A=1"
            ]
        );
        assert_eq!(cmd.env.get("AV_LOG").map(String::as_str), Some("info"));
        assert_eq!(
            cmd.display(),
            "/opt/Meshroom/meshroom_batch --input /w/frames --toNode FeatureExtraction --paramOverrides A=1"
        );
    }

    #[test]
    fn criticality_defaults_to_fatal() {
        assert_eq!(Criticality::default(), Criticality::Fatal);
    }

    #[test]
    fn missing_output_dir_is_invalid_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = require_output_dir(&dir.path().join("Texturing"), "Texturing").unwrap_err();
        assert!(matches!(err, StepError::InvalidOutput(_)));
        assert!(require_output_dir(dir.path(), "Texturing").is_ok());
    }
}
