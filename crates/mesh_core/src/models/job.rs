//! Job definition - one reconstruction request.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default cap on the number of sampled frames.
pub const DEFAULT_MAX_FRAMES: usize = 300;

/// How accelerators are chosen for a job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AcceleratorPolicy {
    /// Query the host and use whatever is found.
    #[default]
    Auto,
    /// Use exactly these ids, unvalidated.
    Explicit(Vec<String>),
}

impl FromStr for AcceleratorPolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let ids = trimmed
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self::Explicit(ids))
    }
}

impl TryFrom<String> for AcceleratorPolicy {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AcceleratorPolicy> for String {
    fn from(policy: AcceleratorPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for AcceleratorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Explicit(ids) => write!(f, "{}", ids.join(",")),
        }
    }
}

/// Sampling profile. Picks the default frame rate when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingProfile {
    /// Sparse sampling for quick turnaround (4 fps).
    #[default]
    Standard,
    /// Dense sampling for detailed scenes (10 fps).
    Dense,
}

impl SamplingProfile {
    pub fn default_fps(&self) -> f64 {
        match self {
            Self::Standard => 4.0,
            Self::Dense => 10.0,
        }
    }
}

impl FromStr for SamplingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "dense" => Ok(Self::Dense),
            other => Err(format!("unknown sampling profile '{}'", other)),
        }
    }
}

/// Error returned when a job definition is unusable.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Video not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("Sample rate must be a positive number of frames per second, got {0}")]
    InvalidSampleRate(f64),
}

/// One reconstruction request.
///
/// Built once with the `with_*` methods, then handed by value to the
/// pipeline that processes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job name, used for the log file.
    pub name: String,
    /// Source video.
    pub video: PathBuf,
    /// Root of everything the job writes.
    pub work_dir: PathBuf,
    /// Target frames per second.
    pub sample_rate: f64,
    /// Frame cap; 0 disables capping.
    pub max_frames: usize,
    pub accelerators: AcceleratorPolicy,
}

impl Job {
    /// Create a job with the standard profile defaults.
    pub fn new(video: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        let video = video.into();
        let name = job_name_for(&video);
        Self {
            name,
            video,
            work_dir: work_dir.into(),
            sample_rate: SamplingProfile::Standard.default_fps(),
            max_frames: DEFAULT_MAX_FRAMES,
            accelerators: AcceleratorPolicy::Auto,
        }
    }

    pub fn with_sample_rate(mut self, fps: f64) -> Self {
        self.sample_rate = fps;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_accelerators(mut self, policy: AcceleratorPolicy) -> Self {
        self.accelerators = policy;
        self
    }

    /// Check the job can be attempted at all.
    pub fn validate(&self) -> Result<(), JobError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(JobError::InvalidSampleRate(self.sample_rate));
        }
        if !self.video.is_file() {
            return Err(JobError::VideoNotFound(self.video.clone()));
        }
        Ok(())
    }

    /// The frame cap, or `None` when capping is disabled.
    pub fn frame_cap(&self) -> Option<usize> {
        (self.max_frames > 0).then_some(self.max_frames)
    }
}

fn job_name_for(video: &Path) -> String {
    video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "mesh_job".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auto_policy() {
        assert_eq!("auto".parse::<AcceleratorPolicy>().unwrap(), AcceleratorPolicy::Auto);
        assert_eq!(" AUTO ".parse::<AcceleratorPolicy>().unwrap(), AcceleratorPolicy::Auto);
    }

    #[test]
    fn parses_explicit_ids() {
        let policy: AcceleratorPolicy = "0, 1,,3".parse().unwrap();
        assert_eq!(
            policy,
            AcceleratorPolicy::Explicit(vec!["0".into(), "1".into(), "3".into()])
        );
        assert_eq!(policy.to_string(), "0,1,3");
    }

    #[test]
    fn empty_explicit_list_means_cpu_only() {
        let policy: AcceleratorPolicy = "".parse().unwrap();
        assert_eq!(policy, AcceleratorPolicy::Explicit(Vec::new()));
    }

    #[test]
    fn job_defaults_follow_standard_profile() {
        let job = Job::new("/videos/IMG_2604.MOV", "/tmp/meshjob");
        assert_eq!(job.name, "IMG_2604");
        assert_eq!(job.sample_rate, 4.0);
        assert_eq!(job.max_frames, 300);
        assert_eq!(job.frame_cap(), Some(300));
        assert_eq!(job.clone().with_max_frames(0).frame_cap(), None);
    }

    #[test]
    fn validate_rejects_bad_rate_and_missing_video() {
        let job = Job::new("/definitely/missing.mov", "/tmp").with_sample_rate(0.0);
        assert!(matches!(job.validate(), Err(JobError::InvalidSampleRate(_))));

        let job = job.with_sample_rate(4.0);
        assert!(matches!(job.validate(), Err(JobError::VideoNotFound(_))));
    }

    #[test]
    fn profile_parses() {
        assert_eq!("dense".parse::<SamplingProfile>().unwrap().default_fps(), 10.0);
        assert!("fast".parse::<SamplingProfile>().is_err());
    }
}
