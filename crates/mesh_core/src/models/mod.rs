//! Data model shared across the orchestrator.

mod artifact;
mod frame;
mod job;
mod layout;

pub use artifact::{Artifact, ArtifactKind};
pub use frame::{frame_file_name, parse_frame_index, Frame, FrameCorpus, FrameFormat, FRAME_PREFIX};
pub use job::{AcceleratorPolicy, Job, JobError, SamplingProfile, DEFAULT_MAX_FRAMES};
pub use layout::WorkLayout;
