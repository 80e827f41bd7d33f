use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::transport::{HttpTransport, TransportError};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to download {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error(
        "checksum mismatch (expected {expected}, got {actual}) and the corrupt file {} could not be removed: {source}",
        path.display()
    )]
    CorruptArtifactLeft {
        path: PathBuf,
        expected: String,
        actual: String,
        #[source]
        source: std::io::Error,
    },
    #[error("downloaded artifact is missing from {}", .0.display())]
    Missing(PathBuf),
}

impl DownloadError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of one download attempt. Consumed by the caller right away.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub staged_path: PathBuf,
    pub failure: Option<DownloadError>,
}

impl DownloadOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// # Errors
    /// Returns the recorded failure, if any.
    pub fn into_result(self) -> Result<PathBuf, DownloadError> {
        match self.failure {
            None => Ok(self.staged_path),
            Some(error) => Err(error),
        }
    }
}

#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn HttpTransport>,
}

impl Downloader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Stream `url` into a `.part` sibling of `output_path`, verify its
    /// SHA-256 when `expected_sha256` is given, and only then rename it over
    /// `output_path`. Readers of `output_path` never see an unverified file.
    ///
    /// Any failure leaves no file behind at `output_path`, except when a
    /// corrupt download cannot be removed, which is reported as
    /// [`DownloadError::CorruptArtifactLeft`]. Nothing is retried here.
    pub async fn download(
        &self,
        url: &str,
        output_path: &Path,
        expected_sha256: Option<&str>,
    ) -> DownloadOutcome {
        debug!("Downloading {url} to {}", output_path.display());

        let part = part_path(output_path);
        let failure = match self.fetch(url, &part).await {
            Ok(bytes) => {
                debug!("Downloaded {bytes} bytes to {}", part.display());
                expected_sha256
                    .map_or(Ok(()), |expected| verify_or_discard(&part, expected))
                    .and_then(|()| promote(&part, output_path))
                    .err()
            }
            Err(error) => {
                error!(
                    "Failed to download {url} to {}: {error}",
                    output_path.display()
                );
                discard_partial(&part);
                Some(error)
            }
        };
        if failure.is_some() {
            discard_partial(output_path);
        }

        DownloadOutcome {
            staged_path: output_path.to_path_buf(),
            failure,
        }
    }

    async fn fetch(&self, url: &str, part: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = part.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::io("failed to create directory", parent, source))?;
        }

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|source| DownloadError::io("failed to create download file", part, source))?;

        let bytes = self
            .transport
            .download_to(url, &mut file)
            .await
            .map_err(|source| DownloadError::Transport {
                url: url.to_string(),
                source,
            })?;
        // Pending writes must land before the file is hashed and renamed.
        file.flush()
            .await
            .map_err(|source| DownloadError::io("failed to flush download file", part, source))?;
        Ok(bytes)
    }
}

/// In-progress download location, next to the final path so the rename
/// stays on one filesystem.
fn part_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    output_path.with_file_name(name)
}

fn promote(part: &Path, output_path: &Path) -> Result<(), DownloadError> {
    std::fs::rename(part, output_path).map_err(|source| {
        discard_partial(part);
        DownloadError::io("failed to move verified download into place", output_path, source)
    })
}

fn verify_or_discard(path: &Path, expected: &str) -> Result<(), DownloadError> {
    let actual = match sha256_file(path) {
        Ok(actual) => actual,
        Err(error) => {
            discard_partial(path);
            return Err(error);
        }
    };

    if actual == expected {
        info!("Checksum {actual} verified for {}", path.display());
        return Ok(());
    }

    warn!("Expected hash {expected} but the download hashed to {actual}");
    match std::fs::remove_file(path) {
        Ok(()) => {
            warn!(
                "Deleted downloaded jar with an incorrect checksum: {}",
                path.display()
            );
            Err(DownloadError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            })
        }
        Err(source) => {
            error!(
                "Failed to delete a download with an incorrect checksum, please delete it manually: {}",
                path.display()
            );
            Err(DownloadError::CorruptArtifactLeft {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
                source,
            })
        }
    }
}

fn discard_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!(
            "Failed to remove partial download {}: {error}",
            path.display()
        ),
    }
}

/// Lowercase hex SHA-256 of a file's contents.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = std::fs::File::open(path)
        .map_err(|source| DownloadError::io("failed to open file for checksum", path, source))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|source| DownloadError::io("failed to read file for checksum", path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DownloadError, Downloader, sha256_file, sha256_hex};
    use crate::test_support::StaticTransport;

    const URL: &str = "https://builds.example/geyser.jar";

    fn downloader_serving(body: &[u8]) -> Downloader {
        let transport = StaticTransport::new();
        transport.serve(URL, body.to_vec());
        Downloader::new(Arc::new(transport))
    }

    #[test]
    fn sha256_file_returns_known_digest() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let file_path = temp.path().join("payload.bin");
        std::fs::write(&file_path, b"abc").expect("payload file should be written");

        let digest = sha256_file(&file_path).expect("checksum should be computed");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest, sha256_hex(b"abc"));
    }

    #[tokio::test]
    async fn download_creates_parent_directories_and_verifies_hash() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("BuildUpdate").join("Geyser-Velocity.jar");
        let downloader = downloader_serving(b"geyser build 101");
        let expected = sha256_hex(b"geyser build 101");

        let outcome = downloader.download(URL, &output, Some(&expected)).await;

        assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.failure);
        assert_eq!(
            std::fs::read(&output).expect("staged file should exist"),
            b"geyser build 101"
        );
    }

    #[tokio::test]
    async fn download_overwrites_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("Geyser-Spigot.jar");
        std::fs::write(&output, b"an older and much longer build").expect("old file written");
        let downloader = downloader_serving(b"new");

        let outcome = downloader.download(URL, &output, None).await;

        assert!(outcome.is_success());
        assert_eq!(std::fs::read(&output).expect("staged file"), b"new");
    }

    #[tokio::test]
    async fn checksum_mismatch_deletes_file_and_reports_both_hashes() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("Geyser-Velocity.jar");
        let downloader = downloader_serving(b"tampered");

        let outcome = downloader.download(URL, &output, Some("abc123")).await;

        assert!(!output.exists(), "corrupt download should be removed");
        match outcome.failure {
            Some(DownloadError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, "abc123");
                assert_eq!(actual, sha256_hex(b"tampered"));
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn checksum_comparison_is_exact() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("Geyser-Velocity.jar");
        let downloader = downloader_serving(b"payload");
        let uppercase = sha256_hex(b"payload").to_ascii_uppercase();

        let outcome = downloader.download(URL, &output, Some(&uppercase)).await;

        assert!(matches!(
            outcome.failure,
            Some(DownloadError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn transport_failure_leaves_no_partial_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("Geyser-BungeeCord.jar");
        let transport = StaticTransport::new();
        transport.fail_after_partial(URL, b"half a jar".to_vec());
        let downloader = Downloader::new(Arc::new(transport));

        let outcome = downloader.download(URL, &output, None).await;

        assert!(matches!(
            outcome.failure,
            Some(DownloadError::Transport { .. })
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn output_path_appears_only_after_verification() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("BuildUpdate").join("Geyser-Velocity.jar");
        let transport = StaticTransport::new();
        transport.serve(URL, b"geyser build 101".to_vec());
        let gate = transport.hold_downloads();
        let downloader = Downloader::new(Arc::new(transport));
        let expected = sha256_hex(b"geyser build 101");

        let task = {
            let output = output.clone();
            tokio::spawn(async move { downloader.download(URL, &output, Some(&expected)).await })
        };
        gate.started.notified().await;

        assert!(!output.exists(), "unverified download must not be visible");
        assert!(
            temp.path()
                .join("BuildUpdate")
                .join("Geyser-Velocity.jar.part")
                .exists()
        );

        gate.release.notify_one();
        let outcome = task.await.expect("download task should join");
        assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.failure);
        assert_eq!(std::fs::read(&output).expect("staged file"), b"geyser build 101");
        assert!(
            !temp
                .path()
                .join("BuildUpdate")
                .join("Geyser-Velocity.jar.part")
                .exists()
        );
    }

    #[tokio::test]
    async fn repeated_downloads_give_the_same_result() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let output = temp.path().join("Geyser-Velocity.jar");
        let downloader = downloader_serving(b"same bytes");
        let expected = sha256_hex(b"same bytes");

        let first = downloader.download(URL, &output, Some(&expected)).await;
        let first_bytes = std::fs::read(&output).expect("first download");
        let second = downloader.download(URL, &output, Some(&expected)).await;
        let second_bytes = std::fs::read(&output).expect("second download");

        assert!(first.is_success() && second.is_success());
        assert_eq!(first_bytes, second_bytes);

        let first = downloader.download(URL, &output, Some("abc123")).await;
        let second = downloader.download(URL, &output, Some("abc123")).await;
        assert!(!first.is_success() && !second.is_success());
        assert!(!output.exists());
    }
}
