//! Sampled frames and the frame corpus handed to reconstruction.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// File name prefix of every sampled frame.
pub const FRAME_PREFIX: &str = "frame_";

/// Image formats frames can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    #[default]
    Png,
    Jpg,
    Ppm,
}

impl FrameFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Ppm => "ppm",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Ppm => image::ImageFormat::Pnm,
        }
    }
}

impl FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "ppm" => Ok(Self::Ppm),
            other => Err(format!("unsupported frame format '{}'", other)),
        }
    }
}

/// Build the file name for a frame index: `frame_000042.png`.
pub fn frame_file_name(index: usize, format: FrameFormat) -> String {
    format!("{}{:06}.{}", FRAME_PREFIX, index, format.extension())
}

/// Parse the index out of a frame file name, if it matches the pattern.
pub fn parse_frame_index(file_name: &str, format: FrameFormat) -> Option<usize> {
    let stem = file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(format.extension())?
        .strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// One sampled frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// 1-based position in temporal order.
    pub index: usize,
    pub path: PathBuf,
}

/// The ordered, contiguous set of frames a job reconstructs from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameCorpus {
    dir: PathBuf,
    format: FrameFormat,
    frames: Vec<Frame>,
}

impl FrameCorpus {
    /// Build a corpus, checking indices are exactly 1..=N in order.
    ///
    /// Returns the first offending index on a gap.
    pub fn new(
        dir: impl Into<PathBuf>,
        format: FrameFormat,
        frames: Vec<Frame>,
    ) -> Result<Self, usize> {
        for (position, frame) in frames.iter().enumerate() {
            if frame.index != position + 1 {
                return Err(position + 1);
            }
        }
        Ok(Self {
            dir: dir.into(),
            format,
            frames,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_names_round_trip() {
        let name = frame_file_name(42, FrameFormat::Png);
        assert_eq!(name, "frame_000042.png");
        assert_eq!(parse_frame_index(&name, FrameFormat::Png), Some(42));
    }

    #[test]
    fn parse_rejects_foreign_files() {
        assert_eq!(parse_frame_index("frame_000001.jpg", FrameFormat::Png), None);
        assert_eq!(parse_frame_index("frame_.png", FrameFormat::Png), None);
        assert_eq!(parse_frame_index("frame_00a001.png", FrameFormat::Png), None);
        assert_eq!(parse_frame_index("thumb_000001.png", FrameFormat::Png), None);
        assert_eq!(parse_frame_index("frame_000001png", FrameFormat::Png), None);
    }

    #[test]
    fn corpus_rejects_gaps() {
        let frames = vec![
            Frame { index: 1, path: "a".into() },
            Frame { index: 3, path: "c".into() },
        ];
        assert_eq!(FrameCorpus::new("/f", FrameFormat::Png, frames).unwrap_err(), 2);
    }

    #[test]
    fn format_parses_jpeg_alias() {
        assert_eq!("JPEG".parse::<FrameFormat>().unwrap(), FrameFormat::Jpg);
        assert_eq!(FrameFormat::Ppm.image_format(), image::ImageFormat::Pnm);
    }
}
