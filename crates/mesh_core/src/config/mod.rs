//! Configuration management for the reconstruction orchestrator.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Defaults for every key
//!
//! # Example
//!
//! ```no_run
//! use mesh_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/video-to-mesh.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Frame cap: {}", config.settings().sampling.max_frames);
//!
//! config.settings_mut().sampling.max_frames = 150;
//! config.update_section(ConfigSection::Sampling).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AcceleratorSettings, ConfigSection, LoggingSettings, PathSettings, ProvisioningSettings,
    ReconstructionSettings, SamplingSettings, Settings, ToolSettings, ToolchainSettings,
};
