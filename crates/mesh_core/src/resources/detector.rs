//! Accelerator detection.
//!
//! Detection never fails a job: a missing tool, a non-zero exit or
//! garbage output all degrade to an empty set.

use std::process::Command;

use crate::models::AcceleratorPolicy;
use crate::process;

use super::accelerators::AcceleratorSet;

/// Queries the host for accelerators.
#[derive(Debug, Clone)]
pub struct ResourceDetector {
    program: String,
}

impl ResourceDetector {
    /// Create a detector that runs `program` (normally `nvidia-smi`).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolve the accelerator set for a policy.
    ///
    /// Explicit ids are used verbatim without probing the host.
    pub fn resolve(&self, policy: &AcceleratorPolicy) -> AcceleratorSet {
        match policy {
            AcceleratorPolicy::Auto => self.detect(),
            AcceleratorPolicy::Explicit(ids) => {
                tracing::debug!("Using explicit accelerator ids: {:?}", ids);
                AcceleratorSet::new(ids.clone())
            }
        }
    }

    /// Enumerate accelerators on the host.
    pub fn detect(&self) -> AcceleratorSet {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--query-gpu=index", "--format=csv,noheader"]);

        // Driver warnings arrive on stderr; only stdout carries ids
        let mut listing = Vec::new();
        let output = match process::run_streaming(&mut cmd, |line, is_stderr| {
            if !is_stderr {
                listing.push(line.to_string());
            }
        }) {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("Accelerator query '{}' unavailable: {}", self.program, e);
                return AcceleratorSet::cpu_only();
            }
        };

        if !output.success() {
            tracing::debug!(
                "Accelerator query '{}' exited with code {}",
                self.program,
                output.exit_code
            );
            return AcceleratorSet::cpu_only();
        }

        let ids = parse_index_listing(&listing);
        tracing::info!("Detected {} accelerator(s)", ids.len());
        AcceleratorSet::new(ids)
    }
}

impl Default for ResourceDetector {
    fn default() -> Self {
        Self::new("nvidia-smi")
    }
}

/// Parse `--query-gpu=index` output: one id per non-empty line.
///
/// Any line that isn't a plain id (e.g. an error banner on stdout) makes
/// the whole listing untrustworthy, so the result is empty.
fn parse_index_listing<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let ids: Vec<String> = lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if ids.iter().all(|id| id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')) {
        ids
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_listing() {
        let ids = parse_index_listing(&["0", " 1 ", "", "2"]);
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[test]
    fn garbage_output_yields_empty() {
        let ids = parse_index_listing(&[
            "NVIDIA-SMI has failed because it couldn't communicate with the NVIDIA driver.",
        ]);
        assert!(ids.is_empty());
    }

    #[test]
    fn missing_tool_yields_empty_set() {
        let detector = ResourceDetector::new("/nonexistent/nvidia-smi");
        assert!(detector.detect().is_empty());
        assert!(detector.resolve(&AcceleratorPolicy::Auto).is_empty());
    }

    #[test]
    fn explicit_policy_skips_detection() {
        // Would yield an empty set if it were run
        let detector = ResourceDetector::new("/nonexistent/nvidia-smi");
        let set = detector.resolve(&AcceleratorPolicy::Explicit(vec!["7".into()]));
        assert_eq!(set.ids(), ["7".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn detects_from_tool_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = crate::test_support::write_script(
            &dir.path().join("nvidia-smi"),
            "printf '0\\n1\\n'",
        );
        let detector = ResourceDetector::new(tool.to_string_lossy());
        assert_eq!(detector.detect().ids(), ["0".to_string(), "1".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn stderr_warning_keeps_detected_ids() {
        let dir = tempfile::tempdir().unwrap();
        let tool = crate::test_support::write_script(
            &dir.path().join("nvidia-smi"),
            "echo 'WARNING: infoROM is corrupted at gpu 0000:01:00.0' >&2\nprintf '0\\n1\\n'",
        );
        let detector = ResourceDetector::new(tool.to_string_lossy());
        assert_eq!(detector.detect().ids(), ["0".to_string(), "1".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let tool = crate::test_support::write_script(
            &dir.path().join("nvidia-smi"),
            "echo 0; exit 9",
        );
        let detector = ResourceDetector::new(tool.to_string_lossy());
        assert!(detector.detect().is_empty());
    }
}
