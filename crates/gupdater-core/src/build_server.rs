use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gupdater_host::InstalledBuild;
use gupdater_platform::ServerPlatform;
use log::{debug, info};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::target::UpdateTarget;
use crate::transport::{HttpTransport, TransportError};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Request(#[from] TransportError),
    #[error("failed to parse build metadata from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("build server lists no {platform} download for branch {branch}")]
    PlatformMissing {
        platform: ServerPlatform,
        branch: String,
    },
    #[error("unexpected version string: {0:?}")]
    UnexpectedVersion(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadEntry {
    pub name: String,
    pub sha256: String,
}

/// Response of the build server's "latest build" endpoint. Only the fields
/// the updater reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildMetadata {
    #[serde(deserialize_with = "build_identifier")]
    pub build: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    pub downloads: HashMap<String, DownloadEntry>,
}

fn build_identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(number) => number.to_string(),
        Raw::Text(text) => text,
    })
}

/// Answer to "is the installed build the latest one?". Built fresh per check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatus {
    pub latest: String,
    pub current: String,
    pub branch: String,
    pub expected_sha256: String,
    pub download_url: String,
    pub artifact_name: String,
    /// When the latest build was published, if the build server says.
    pub published: Option<DateTime<Utc>>,
}

impl BuildStatus {
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.latest == self.current
    }
}

#[derive(Clone)]
pub struct BuildServer {
    transport: Arc<dyn HttpTransport>,
}

impl BuildServer {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetch the latest build metadata for `branch`.
    ///
    /// # Errors
    /// Returns an error if the server is unreachable, answers with a non-2xx
    /// status, or the body is not valid metadata.
    pub async fn latest_build(
        &self,
        target: &UpdateTarget,
        branch: &str,
    ) -> Result<BuildMetadata, OracleError> {
        let url = target.metadata_url(branch);
        debug!("Fetching latest build metadata from {url}");

        let body = self.transport.get_text(&url).await?;
        serde_json::from_str(&body).map_err(|source| OracleError::Parse { url, source })
    }

    /// Compare the installed build against the latest one on its branch.
    ///
    /// # Errors
    /// Any failure to obtain or interpret the metadata, including a missing
    /// download entry for the target platform. A failure never reads as
    /// "outdated".
    pub async fn check(
        &self,
        target: &UpdateTarget,
        installed: &InstalledBuild,
    ) -> Result<BuildStatus, OracleError> {
        let metadata = self.latest_build(target, &installed.branch).await?;
        let entry = metadata
            .downloads
            .get(target.platform.url_component())
            .ok_or_else(|| OracleError::PlatformMissing {
                platform: target.platform,
                branch: installed.branch.clone(),
            })?;

        let status = BuildStatus {
            latest: metadata.build.clone(),
            current: installed.build.clone(),
            branch: installed.branch.clone(),
            expected_sha256: entry.sha256.clone(),
            download_url: target.download_url(&installed.branch),
            artifact_name: entry.name.clone(),
            published: metadata.time,
        };

        if status.is_latest() {
            debug!(
                "Installed build {} is the latest on {}",
                status.current, status.branch
            );
        } else if let Some(published) = status.published {
            info!(
                "Build {} is available on {} (published {}, installed: {})",
                status.latest,
                status.branch,
                published.date_naive(),
                status.current
            );
        } else {
            info!(
                "Build {} is available on {} (installed: {})",
                status.latest, status.branch, status.current
            );
        }
        Ok(status)
    }

    /// # Errors
    /// Same as [`BuildServer::check`].
    pub async fn is_latest(
        &self,
        target: &UpdateTarget,
        installed: &InstalledBuild,
    ) -> Result<bool, OracleError> {
        Ok(self.check(target, installed).await?.is_latest())
    }
}
