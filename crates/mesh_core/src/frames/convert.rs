//! Parallel conversion of sampled frames to another image format.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use rayon::prelude::*;

use crate::models::{frame_file_name, Frame, FrameCorpus, FrameFormat};
use crate::resources::logical_cpus;

use super::types::{ExtractionError, ExtractionResult};

/// Convert every frame of `corpus` into `dest_dir` as `target`.
///
/// Runs on a dedicated pool sized to the logical CPU count. Indices are
/// preserved, so the result is as contiguous as the input.
pub fn convert_corpus(
    corpus: &FrameCorpus,
    dest_dir: &Path,
    target: FrameFormat,
) -> ExtractionResult<FrameCorpus> {
    fs::create_dir_all(dest_dir).map_err(|e| ExtractionError::io(dest_dir, e))?;

    // Stale output of an earlier run would make the directory ambiguous
    super::cap::clear_frames(dest_dir, target).map_err(|e| ExtractionError::io(dest_dir, e))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(logical_cpus())
        .build()
        .map_err(|e| ExtractionError::Conversion {
            path: dest_dir.to_path_buf(),
            message: format!("failed to build thread pool: {}", e),
        })?;

    tracing::info!(
        "Converting {} frames to {} in {}",
        corpus.len(),
        target.extension(),
        dest_dir.display()
    );

    let converted: Vec<Frame> = pool.install(|| {
        corpus
            .frames()
            .par_iter()
            .map(|frame| convert_frame(frame, dest_dir, target))
            .collect::<ExtractionResult<Vec<Frame>>>()
    })?;

    FrameCorpus::new(dest_dir, target, converted).map_err(|index| {
        ExtractionError::NonContiguous {
            dir: dest_dir.to_path_buf(),
            index,
        }
    })
}

fn convert_frame(frame: &Frame, dest_dir: &Path, target: FrameFormat) -> ExtractionResult<Frame> {
    let conversion_error = |path: &Path, e: image::ImageError| ExtractionError::Conversion {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let img = image::open(&frame.path).map_err(|e| conversion_error(&frame.path, e))?;

    // PPM and JPEG carry no alpha channel
    let img = match target {
        FrameFormat::Ppm | FrameFormat::Jpg => DynamicImage::ImageRgb8(img.to_rgb8()),
        FrameFormat::Png => img,
    };

    let dest: PathBuf = dest_dir.join(frame_file_name(frame.index, target));
    img.save_with_format(&dest, target.image_format())
        .map_err(|e| conversion_error(&dest, e))?;

    Ok(Frame {
        index: frame.index,
        path: dest,
    })
}
