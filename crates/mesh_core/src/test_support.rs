//! Shared helpers for tests that stand in for external tools.

use std::fs;
use std::path::{Path, PathBuf};

/// Write an executable POSIX shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// A fake ffmpeg that writes `count` empty frames to the pattern given as
/// its last argument.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, count: usize) -> PathBuf {
    write_script(
        &dir.join("ffmpeg"),
        &format!(
            r#"for last; do :; done
i=1
while [ $i -le {count} ]; do
  : > "$(printf "$last" $i)"
  i=$((i+1))
done
echo "frame={count}" >&2
exit 0"#
        ),
    )
}

/// A fake ffmpeg that always fails.
#[cfg(unix)]
pub fn failing_ffmpeg(dir: &Path, exit_code: i32) -> PathBuf {
    write_script(
        &dir.join("ffmpeg"),
        &format!("echo 'Invalid data found when processing input' >&2\nexit {}", exit_code),
    )
}

/// Create `count` empty files named `frame_%06d.<ext>` in `dir`.
pub fn touch_frames(dir: &Path, count: usize, ext: &str) {
    fs::create_dir_all(dir).unwrap();
    for i in 1..=count {
        fs::write(dir.join(format!("frame_{:06}.{}", i, ext)), b"").unwrap();
    }
}
