//! Toolchain provisioning.
//!
//! Makes sure a runnable reconstruction binary exists under a target
//! directory, downloading and unpacking the release archive at most once.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::ToolchainSettings;

use super::archive;
use super::errors::ProvisioningError;
use super::fetch::{ArchiveFetcher, HttpFetcher};

/// Directory depth searched for the executable inside the unpacked tree.
const MAX_SEARCH_DEPTH: usize = 8;

/// A located, runnable toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Unpacked root directory (e.g. `Meshroom-2025.1.0-Linux`).
    pub root: PathBuf,
    /// The batch executable stages are run with.
    pub executable: PathBuf,
}

/// What provisioning had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningResult {
    /// A runnable binary was already in place.
    AlreadyPresent(Toolchain),
    /// The archive was unpacked; `downloaded` is false when an archive
    /// already on disk was reused.
    Installed {
        toolchain: Toolchain,
        downloaded: bool,
    },
}

impl ProvisioningResult {
    pub fn toolchain(&self) -> &Toolchain {
        match self {
            ProvisioningResult::AlreadyPresent(toolchain) => toolchain,
            ProvisioningResult::Installed { toolchain, .. } => toolchain,
        }
    }

    pub fn into_toolchain(self) -> Toolchain {
        match self {
            ProvisioningResult::AlreadyPresent(toolchain) => toolchain,
            ProvisioningResult::Installed { toolchain, .. } => toolchain,
        }
    }
}

/// Progress updates during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionProgress {
    Downloading { percent: u8 },
    Verifying,
    Extracting,
    Ready,
}

/// Installs the reconstruction toolchain into a directory.
pub struct ToolchainProvisioner<F: ArchiveFetcher = HttpFetcher> {
    settings: ToolchainSettings,
    fetcher: F,
}

impl ToolchainProvisioner<HttpFetcher> {
    pub fn new(settings: ToolchainSettings) -> Self {
        Self::with_fetcher(settings, HttpFetcher::new())
    }
}

impl<F: ArchiveFetcher> ToolchainProvisioner<F> {
    pub fn with_fetcher(settings: ToolchainSettings, fetcher: F) -> Self {
        Self { settings, fetcher }
    }

    pub fn settings(&self) -> &ToolchainSettings {
        &self.settings
    }

    /// Archive URL for the configured version.
    pub fn archive_url(&self) -> String {
        self.settings.archive_url()
    }

    /// Local file the archive is stored as inside `target`.
    pub fn archive_path(&self, target: &Path) -> PathBuf {
        target.join(archive_file_name(&self.archive_url()))
    }

    /// Find an already runnable toolchain under `target`.
    pub fn locate(&self, target: &Path) -> Option<Toolchain> {
        let root = newest_dir_with_prefix(target, &self.settings.dir_prefix)?;
        let executable = find_executable(&root, &self.settings.executable_names)?;
        is_executable(&executable).then_some(Toolchain { root, executable })
    }

    /// Ensure a runnable toolchain exists under `target`.
    ///
    /// When one is present this is only a presence check. Otherwise an
    /// archive already in `target` is reused, or downloaded, then unpacked
    /// and the executable is marked runnable.
    pub fn ensure(
        &self,
        target: &Path,
        progress: impl Fn(ProvisionProgress),
    ) -> Result<ProvisioningResult, ProvisioningError> {
        if let Some(toolchain) = self.locate(target) {
            tracing::info!(
                "Toolchain already available at {}",
                toolchain.executable.display()
            );
            progress(ProvisionProgress::Ready);
            return Ok(ProvisioningResult::AlreadyPresent(toolchain));
        }

        fs::create_dir_all(target).map_err(|e| ProvisioningError::CreateDir {
            path: target.to_path_buf(),
            source: e,
        })?;

        let url = self.archive_url();
        let archive_path = self.archive_path(target);
        let mut downloaded = false;

        if archive_path.is_file() && self.checksum_ok(&archive_path)? {
            tracing::info!("Reusing archive {}", archive_path.display());
        } else {
            progress(ProvisionProgress::Downloading { percent: 0 });
            self.fetcher.fetch(&url, &archive_path, &|percent| {
                progress(ProvisionProgress::Downloading { percent })
            })?;
            downloaded = true;

            if !self.settings.sha256.is_empty() {
                progress(ProvisionProgress::Verifying);
                archive::verify_sha256(&archive_path, &self.settings.sha256)?;
            }
        }

        progress(ProvisionProgress::Extracting);
        archive::extract(&archive_path, target)?;

        let toolchain = self.finish_install(target)?;

        // Unpacked tree is authoritative from here on
        fs::remove_file(&archive_path).ok();

        progress(ProvisionProgress::Ready);
        tracing::info!("Toolchain ready at {}", toolchain.executable.display());

        Ok(ProvisioningResult::Installed {
            toolchain,
            downloaded,
        })
    }

    /// Whether an archive already on disk may be reused.
    ///
    /// A stale archive with the wrong checksum is removed so it gets
    /// downloaded again.
    fn checksum_ok(&self, archive_path: &Path) -> Result<bool, ProvisioningError> {
        if self.settings.sha256.is_empty() {
            return Ok(true);
        }
        match archive::verify_sha256(archive_path, &self.settings.sha256) {
            Ok(()) => Ok(true),
            Err(ProvisioningError::ChecksumMismatch { .. }) => {
                tracing::warn!(
                    "Discarding archive with wrong checksum: {}",
                    archive_path.display()
                );
                fs::remove_file(archive_path)
                    .map_err(|e| ProvisioningError::io(archive_path, e))?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn finish_install(&self, target: &Path) -> Result<Toolchain, ProvisioningError> {
        let not_found = |path: &Path| ProvisioningError::ExecutableNotFound {
            path: path.to_path_buf(),
            names: self.settings.executable_names.join(", "),
        };

        let root = newest_dir_with_prefix(target, &self.settings.dir_prefix)
            .ok_or_else(|| not_found(target))?;
        let executable =
            find_executable(&root, &self.settings.executable_names).ok_or_else(|| not_found(&root))?;

        make_executable(&executable)?;

        Ok(Toolchain { root, executable })
    }
}

/// Last path segment of a URL, without query or fragment.
fn archive_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "toolchain.tar.gz".to_string(),
    }
}

/// Most recently modified directory in `dir` whose name starts with `prefix`.
fn newest_dir_with_prefix(dir: &Path, prefix: &str) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .max()
        .map(|(_, path)| path)
}

/// Search `root` for the first of `names`, in priority order.
fn find_executable(root: &Path, names: &[String]) -> Option<PathBuf> {
    names
        .iter()
        .find_map(|name| find_file(root, name, MAX_SEARCH_DEPTH))
}

fn find_file(dir: &Path, name: &str, depth: usize) -> Option<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir).ok()?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            subdirs.push(entry.path());
        } else if entry.file_name() == name {
            return Some(entry.path());
        }
    }

    if depth == 0 {
        return None;
    }
    subdirs
        .iter()
        .find_map(|subdir| find_file(subdir, name, depth - 1))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ProvisioningError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| ProvisioningError::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ProvisioningError> {
    Ok(())
}
