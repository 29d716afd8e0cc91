//! Compute resource detection and assignment.

mod accelerators;
mod detector;

pub use accelerators::{
    logical_cpus, thread_hint, AcceleratorSet, ACCELERATOR_ENV_VARS, THREAD_HINT_ENV_VAR,
};
pub use detector::ResourceDetector;
