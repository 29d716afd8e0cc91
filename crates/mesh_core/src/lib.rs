//! Mesh Core - Backend logic for video-to-mesh reconstruction
//!
//! This crate drives an external photogrammetry toolchain from a raw video
//! to a textured mesh. It has zero CLI dependencies and can be embedded in
//! other front ends.

pub mod artifacts;
pub mod config;
pub mod frames;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod resources;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod test_support;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
