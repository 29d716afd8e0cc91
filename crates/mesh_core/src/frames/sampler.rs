//! Frame extraction from the source video.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::models::{FrameCorpus, FrameFormat, FRAME_PREFIX};
use crate::process;

use super::cap::{cap_frames, clear_frames, list_frames};
use super::types::{ExtractionError, ExtractionResult, SamplingOutcome};

/// Diagnostic lines kept in a `CommandFailed` message.
const MESSAGE_TAIL_LINES: usize = 10;

/// Samples frames out of a video with ffmpeg.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    ffmpeg: String,
    format: FrameFormat,
}

impl FrameSampler {
    /// Create a sampler using `ffmpeg` (name in PATH or absolute path).
    pub fn new(ffmpeg: impl Into<String>, format: FrameFormat) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            format,
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Arguments for one extraction run.
    pub fn build_args(&self, video: &Path, out_dir: &Path, sample_rate: f64) -> Vec<String> {
        let pattern = out_dir.join(format!("{}%06d.{}", FRAME_PREFIX, self.format.extension()));
        vec![
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-vf".to_string(),
            format!("fps={},scale=iw:ih:flags=bicubic", sample_rate),
            "-q:v".to_string(),
            "2".to_string(),
            pattern.to_string_lossy().into_owned(),
        ]
    }

    /// Extract frames from `video` into `out_dir` at `sample_rate` fps.
    ///
    /// Frames from an earlier run are removed first. With a cap, only the
    /// chronologically earliest `max_frames` frames are kept. `on_line`
    /// receives the tool's output as `(line, is_stderr)`.
    pub fn sample<F>(
        &self,
        video: &Path,
        out_dir: &Path,
        sample_rate: f64,
        max_frames: Option<usize>,
        on_line: F,
    ) -> ExtractionResult<SamplingOutcome>
    where
        F: FnMut(&str, bool),
    {
        if !video.is_file() {
            return Err(ExtractionError::FileNotFound(video.to_path_buf()));
        }

        fs::create_dir_all(out_dir).map_err(|e| ExtractionError::io(out_dir, e))?;

        let stale_removed =
            clear_frames(out_dir, self.format).map_err(|e| ExtractionError::io(out_dir, e))?;
        if stale_removed > 0 {
            tracing::info!(
                "Removed {} stale frames from {}",
                stale_removed,
                out_dir.display()
            );
        }

        let args = self.build_args(video, out_dir, sample_rate);
        tracing::debug!("Running: {}", process::display_command(&self.ffmpeg, &args));

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&args);

        let output =
            process::run_streaming(&mut cmd, on_line).map_err(|e| ExtractionError::SpawnFailed {
                tool: self.ffmpeg.clone(),
                source: e,
            })?;

        if !output.success() {
            let start = output.lines.len().saturating_sub(MESSAGE_TAIL_LINES);
            return Err(ExtractionError::CommandFailed {
                tool: self.ffmpeg.clone(),
                exit_code: output.exit_code,
                message: output.lines[start..].join("\n"),
            });
        }

        let frames = list_frames(out_dir, self.format).map_err(|e| ExtractionError::io(out_dir, e))?;
        let raw_count = frames.len();

        let (frames, removed) = match max_frames {
            Some(max) => cap_frames(frames, max).map_err(|e| ExtractionError::io(out_dir, e))?,
            None => (frames, Vec::new()),
        };

        if !removed.is_empty() {
            tracing::info!(
                "Capped {} extracted frames to the first {}",
                raw_count,
                frames.len()
            );
        }

        let corpus = FrameCorpus::new(out_dir, self.format, frames).map_err(|index| {
            ExtractionError::NonContiguous {
                dir: out_dir.to_path_buf(),
                index,
            }
        })?;

        tracing::info!("Sampled {} frames into {}", corpus.len(), out_dir.display());

        Ok(SamplingOutcome {
            corpus,
            raw_count,
            removed: removed.len(),
            stale_removed,
        })
    }
}
