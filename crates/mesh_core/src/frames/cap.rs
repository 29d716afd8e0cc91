//! Frame listing and deterministic capping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::{parse_frame_index, Frame, FrameFormat};

/// Every `frame_NNNNNN.<ext>` file in `dir`, sorted by index.
///
/// A missing directory lists as empty.
pub fn list_frames(dir: &Path, format: FrameFormat) -> io::Result<Vec<Frame>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = parse_frame_index(&name.to_string_lossy(), format) {
            frames.push(Frame {
                index,
                path: entry.path(),
            });
        }
    }

    frames.sort_by_key(|f| f.index);
    Ok(frames)
}

/// Delete every frame file in `dir`. Returns how many were removed.
pub fn clear_frames(dir: &Path, format: FrameFormat) -> io::Result<usize> {
    let frames = list_frames(dir, format)?;
    for frame in &frames {
        fs::remove_file(&frame.path)?;
    }
    Ok(frames.len())
}

/// Keep the first `max_frames` frames in index order and delete the rest.
///
/// Returns the kept frames and the paths that were removed. `frames` must
/// be sorted by index.
pub fn cap_frames(frames: Vec<Frame>, max_frames: usize) -> io::Result<(Vec<Frame>, Vec<PathBuf>)> {
    if frames.len() <= max_frames {
        return Ok((frames, Vec::new()));
    }

    let mut kept = frames;
    let excess = kept.split_off(max_frames);
    let mut removed = Vec::with_capacity(excess.len());
    for frame in excess {
        fs::remove_file(&frame.path)?;
        removed.push(frame.path);
    }
    Ok((kept, removed))
}
