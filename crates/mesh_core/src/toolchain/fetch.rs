//! Archive download.
//!
//! The provisioner only sees the [`ArchiveFetcher`] trait; [`HttpFetcher`]
//! is the production implementation.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;

use super::errors::ProvisioningError;

/// Fetches an archive from `url` into `dest`.
pub trait ArchiveFetcher {
    /// Download `url` to `dest`, reporting percent complete when the size
    /// is known. Returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path, progress: &dyn Fn(u8))
        -> Result<u64, ProvisioningError>;
}

impl<T: ArchiveFetcher + ?Sized> ArchiveFetcher for &T {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn Fn(u8),
    ) -> Result<u64, ProvisioningError> {
        (**self).fetch(url, dest, progress)
    }
}

impl<T: ArchiveFetcher + ?Sized> ArchiveFetcher for Box<T> {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn Fn(u8),
    ) -> Result<u64, ProvisioningError> {
        (**self).fetch(url, dest, progress)
    }
}

/// HTTP(S) download over reqwest.
///
/// Each fetch runs on a private current-thread runtime so callers stay
/// synchronous.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn Fn(u8),
    ) -> Result<u64, ProvisioningError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ProvisioningError::Download {
                url: url.to_string(),
                message: format!("failed to start runtime: {}", e),
            })?;

        runtime.block_on(download(&self.client, url, dest, progress))
    }
}

/// Stream `url` into `<dest>.part`, then rename onto `dest`.
///
/// An interrupted download never leaves a file at `dest`.
async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: &dyn Fn(u8),
) -> Result<u64, ProvisioningError> {
    tracing::info!("Downloading {}", url);

    let network_error = |e: reqwest::Error| ProvisioningError::Download {
        url: url.to_string(),
        message: e.to_string(),
    };

    let response = client.get(url).send().await.map_err(network_error)?;

    if !response.status().is_success() {
        return Err(ProvisioningError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let total_size = response.content_length().unwrap_or(0);
    let part_path = part_path(dest);
    let mut file =
        fs::File::create(&part_path).map_err(|e| ProvisioningError::io(&part_path, e))?;

    let mut downloaded: u64 = 0;
    let mut last_percent = None;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network_error)?;
        file.write_all(&chunk)
            .map_err(|e| ProvisioningError::io(&part_path, e))?;
        downloaded += chunk.len() as u64;

        if total_size > 0 {
            let percent = ((downloaded as f64 / total_size as f64) * 100.0).min(100.0) as u8;
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                progress(percent);
            }
        }
    }

    file.flush()
        .map_err(|e| ProvisioningError::io(&part_path, e))?;
    drop(file);

    fs::rename(&part_path, dest).map_err(|e| ProvisioningError::io(dest, e))?;
    tracing::info!("Downloaded {} bytes to {}", downloaded, dest.display());

    Ok(downloaded)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/tmp/Meshroom.tar.gz")),
            PathBuf::from("/tmp/Meshroom.tar.gz.part")
        );
    }

    #[test]
    fn unreachable_host_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.tar.gz");
        let err = HttpFetcher::new()
            .fetch("http://127.0.0.1:1/archive.tar.gz", &dest, &|_| {})
            .unwrap_err();

        match err {
            ProvisioningError::Download { url, .. } => {
                assert_eq!(url, "http://127.0.0.1:1/archive.tar.gz")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
    }
}
