//! Final artifact collection.

mod collector;

pub use collector::{ArtifactCollector, CollectionOutcome};
