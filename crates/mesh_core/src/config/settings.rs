//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};
use crate::models::{AcceleratorPolicy, FrameFormat, SamplingProfile, DEFAULT_MAX_FRAMES};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub sampling: SamplingSettings,

    #[serde(default)]
    pub toolchain: ToolchainSettings,

    #[serde(default)]
    pub reconstruction: ReconstructionSettings,

    #[serde(default)]
    pub accelerators: AcceleratorSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub provisioning: ProvisioningSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Configuration sections, one per TOML table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Sampling,
    Toolchain,
    Reconstruction,
    Accelerators,
    Tools,
    Provisioning,
    Logging,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 8] = [
        ConfigSection::Paths,
        ConfigSection::Sampling,
        ConfigSection::Toolchain,
        ConfigSection::Reconstruction,
        ConfigSection::Accelerators,
        ConfigSection::Tools,
        ConfigSection::Provisioning,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Sampling => "sampling",
            ConfigSection::Toolchain => "toolchain",
            ConfigSection::Reconstruction => "reconstruction",
            ConfigSection::Accelerators => "accelerators",
            ConfigSection::Tools => "tools",
            ConfigSection::Provisioning => "provisioning",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the table in a generated config file.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Working and log directories",
            ConfigSection::Sampling => "Frame sampling from the source video",
            ConfigSection::Toolchain => "Reconstruction toolchain download",
            ConfigSection::Reconstruction => "Reconstruction stage parameters",
            ConfigSection::Accelerators => "GPU selection (\"auto\" or comma-separated ids)",
            ConfigSection::Tools => "External tool locations",
            ConfigSection::Provisioning => "Optional system dependency installation",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

/// Path configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Working directory for frames, toolchain cache and outputs.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Folder for job logs. Empty means `<work_dir>/logs`.
    #[serde(default)]
    pub logs_folder: String,
}

fn default_work_dir() -> String {
    "meshjob".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            logs_folder: String::new(),
        }
    }
}

/// Frame sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Profile used when `fps` is unset.
    #[serde(default)]
    pub profile: SamplingProfile,

    /// Explicit frames per second; overrides the profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    /// Keep at most this many frames (first N). 0 disables the cap.
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,

    /// Format ffmpeg writes frames in.
    #[serde(default)]
    pub frame_format: FrameFormat,

    /// Optional intermediate format frames are converted to before
    /// reconstruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_to: Option<FrameFormat>,
}

fn default_max_frames() -> usize {
    DEFAULT_MAX_FRAMES
}

impl SamplingSettings {
    /// Frame rate after applying the profile default.
    pub fn effective_fps(&self) -> f64 {
        self.fps.unwrap_or_else(|| self.profile.default_fps())
    }
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            profile: SamplingProfile::default(),
            fps: None,
            max_frames: default_max_frames(),
            frame_format: FrameFormat::default(),
            convert_to: None,
        }
    }
}

/// Toolchain download configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainSettings {
    #[serde(default = "default_toolchain_version")]
    pub version: String,

    /// Archive URL; `{version}` is substituted.
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Name prefix of the unpacked root directory.
    #[serde(default = "default_dir_prefix")]
    pub dir_prefix: String,

    /// Executable names searched for inside the unpacked tree, in order.
    #[serde(default = "default_executable_names")]
    pub executable_names: Vec<String>,

    /// Where the toolchain is unpacked. Empty means the job's work_dir.
    #[serde(default)]
    pub install_dir: String,

    /// Expected SHA-256 of the archive (hex). Empty skips verification.
    #[serde(default)]
    pub sha256: String,
}

fn default_toolchain_version() -> String {
    "2025.1.0".to_string()
}

fn default_url_template() -> String {
    "https://zenodo.org/records/16887472/files/Meshroom-{version}-Linux.tar.gz".to_string()
}

fn default_dir_prefix() -> String {
    "Meshroom-".to_string()
}

fn default_executable_names() -> Vec<String> {
    vec![
        "meshroom_batch".to_string(),
        "Meshroom_photogrammetry".to_string(),
    ]
}

impl ToolchainSettings {
    /// Archive URL for the configured version.
    pub fn archive_url(&self) -> String {
        self.url_template.replace("{version}", &self.version)
    }

    /// Install directory, falling back to `work_dir`.
    pub fn install_dir_or(&self, work_dir: &std::path::Path) -> PathBuf {
        if self.install_dir.is_empty() {
            work_dir.to_path_buf()
        } else {
            PathBuf::from(&self.install_dir)
        }
    }
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            version: default_toolchain_version(),
            url_template: default_url_template(),
            dir_prefix: default_dir_prefix(),
            executable_names: default_executable_names(),
            install_dir: String::new(),
            sha256: String::new(),
        }
    }
}

/// Parameters passed to the reconstruction stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionSettings {
    /// Toolchain pipeline template.
    #[serde(default = "default_pipeline")]
    pub pipeline: String,

    /// Name of the tool-owned cache directory under `output/`.
    #[serde(default = "default_cache_dir_name")]
    pub cache_dir_name: String,

    /// File the toolchain saves its stage graph to, under `output/`.
    #[serde(default = "default_graph_file")]
    pub graph_file: String,

    /// Feature describer density preset.
    #[serde(default = "default_describer_preset")]
    pub describer_preset: String,

    /// Feature describer quality.
    #[serde(default = "default_describer_quality")]
    pub describer_quality: String,

    /// Upper bound on points fed to meshing.
    #[serde(default = "default_max_points")]
    pub max_points: u64,
}

fn default_pipeline() -> String {
    "photogrammetry".to_string()
}

fn default_cache_dir_name() -> String {
    "MeshroomCache".to_string()
}

fn default_graph_file() -> String {
    "meshroom_graph.json".to_string()
}

fn default_describer_preset() -> String {
    "high".to_string()
}

fn default_describer_quality() -> String {
    "ultra".to_string()
}

fn default_max_points() -> u64 {
    5_000_000
}

impl Default for ReconstructionSettings {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            cache_dir_name: default_cache_dir_name(),
            graph_file: default_graph_file(),
            describer_preset: default_describer_preset(),
            describer_quality: default_describer_quality(),
            max_points: default_max_points(),
        }
    }
}

/// Accelerator selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorSettings {
    #[serde(default)]
    pub policy: AcceleratorPolicy,

    /// Program queried for accelerator ids.
    #[serde(default = "default_detect_program")]
    pub detect_program: String,
}

fn default_detect_program() -> String {
    "nvidia-smi".to_string()
}

impl Default for AcceleratorSettings {
    fn default() -> Self {
        Self {
            policy: AcceleratorPolicy::Auto,
            detect_program: default_detect_program(),
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Frame extraction tool (name in PATH or absolute path).
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
        }
    }
}

/// Best-effort system dependency installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Run the install command when the probe fails.
    #[serde(default)]
    pub install_system_deps: bool,

    /// Command prefix; packages are appended.
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,

    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// Program whose `-version` run proves dependencies are present.
    #[serde(default = "default_ffmpeg")]
    pub probe_program: String,
}

fn default_install_command() -> Vec<String> {
    ["sudo", "apt-get", "install", "-y"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_packages() -> Vec<String> {
    ["ffmpeg", "libgl1", "libx11-6", "libxext6", "libxrender1"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            install_system_deps: false,
            install_command: default_install_command(),
            packages: default_packages(),
            probe_program: default_ffmpeg(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Keep tool output out of the job log except on failure.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines shown when a stage fails.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl LoggingSettings {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            error_tail: self.error_tail as usize,
            show_timestamps: self.show_timestamps,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}
