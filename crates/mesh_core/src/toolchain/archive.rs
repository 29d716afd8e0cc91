//! Archive unpacking and verification.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::errors::ProvisioningError;

/// Supported archive containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Detect the archive kind from its file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }
}

/// Unpack `archive` into `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ProvisioningError> {
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| {
        ProvisioningError::UnsupportedArchive {
            path: archive.to_path_buf(),
        }
    })?;

    tracing::info!("Extracting {} into {}", archive.display(), dest.display());

    let file = fs::File::open(archive).map_err(|e| ProvisioningError::io(archive, e))?;
    let extract_error = |message: String| ProvisioningError::Extract {
        path: archive.to_path_buf(),
        message,
    };

    match kind {
        ArchiveKind::TarGz => {
            use flate2::read::GzDecoder;
            use tar::Archive;

            let mut tarball = Archive::new(GzDecoder::new(file));
            tarball.set_preserve_permissions(true);
            tarball
                .unpack(dest)
                .map_err(|e| extract_error(e.to_string()))
        }
        ArchiveKind::Zip => {
            let mut zipped =
                zip::ZipArchive::new(file).map_err(|e| extract_error(e.to_string()))?;
            zipped
                .extract(dest)
                .map_err(|e| extract_error(e.to_string()))
        }
    }
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check `path` against an expected hex digest (case-insensitive).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), ProvisioningError> {
    let actual = sha256_file(path).map_err(|e| ProvisioningError::io(path, e))?;
    let expected = expected.trim().to_ascii_lowercase();
    if actual == expected {
        tracing::debug!("Checksum verified for {}", path.display());
        Ok(())
    } else {
        Err(ProvisioningError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }
}
