//! Frame sampling: extraction, capping and optional format conversion.
//!
//! The sampler always hands back a contiguous corpus `frame_000001..N`
//! holding the chronologically earliest frames.

mod cap;
mod convert;
mod sampler;
mod types;

pub use cap::{cap_frames, clear_frames, list_frames};
pub use convert::convert_corpus;
pub use sampler::FrameSampler;
pub use types::{ExtractionError, ExtractionResult, SamplingOutcome};
