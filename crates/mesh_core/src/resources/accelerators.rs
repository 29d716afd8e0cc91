//! The set of accelerators assigned to a job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Variables that restrict which accelerators a stage may see.
pub const ACCELERATOR_ENV_VARS: [&str; 2] = ["ALICEVISION_CUDA_DEVICES", "CUDA_VISIBLE_DEVICES"];

/// Variable carrying the CPU thread-count hint.
pub const THREAD_HINT_ENV_VAR: &str = "OMP_NUM_THREADS";

/// Ordered accelerator ids chosen for a job. Empty means CPU-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratorSet {
    ids: Vec<String>,
}

impl AcceleratorSet {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn cpu_only() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Environment entries for a stage. Empty for a CPU-only set.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        if self.ids.is_empty() {
            return Vec::new();
        }
        let joined = self.ids.join(",");
        ACCELERATOR_ENV_VARS
            .iter()
            .map(|name| (*name, joined.clone()))
            .collect()
    }
}

impl fmt::Display for AcceleratorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ids.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.ids.join(","))
        }
    }
}

/// CPU thread hint for stages: one core is left for the orchestrator.
pub fn thread_hint(logical_cpus: usize) -> usize {
    logical_cpus.saturating_sub(1).max(1)
}

/// Logical CPU count of the host, 1 if unknown.
pub fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
