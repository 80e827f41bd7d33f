use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use semver::Version;

use crate::build_server::OracleError;
use crate::transport::HttpTransport;

pub const UPDATER_VERSION_URL: &str = "https://api.spigotmc.org/legacy/update.php?resource=88555";
pub const UPDATER_RESOURCE_PAGE: &str = "https://www.spigotmc.org/resources/geyserupdater.88555/";

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.){1,2}\d+$").expect("version pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterRelease {
    pub current_version: String,
    pub latest_version: String,
    pub resource_url: String,
}

impl UpdaterRelease {
    #[must_use]
    pub fn is_newer(&self) -> bool {
        is_newer_version(&self.latest_version, &self.current_version)
    }
}

/// Fetch the newest published updater version from a plain text page.
///
/// # Errors
/// Returns an error if the page cannot be fetched or does not contain a
/// dotted numeric version.
pub async fn latest_updater_version(
    transport: &dyn HttpTransport,
    url: &str,
) -> Result<String, OracleError> {
    let body = transport.get_text(url).await?;
    let version: String = body.chars().filter(|ch| !ch.is_whitespace()).collect();

    if VERSION_PATTERN.is_match(&version) {
        Ok(version)
    } else {
        Err(OracleError::UnexpectedVersion(version))
    }
}

/// Compare the running updater against the published version. Informational
/// only; nothing is downloaded.
///
/// # Errors
/// Same as [`latest_updater_version`].
pub async fn check_updater_version(
    transport: &dyn HttpTransport,
    current_version: &str,
) -> Result<UpdaterRelease, OracleError> {
    let latest = latest_updater_version(transport, UPDATER_VERSION_URL).await?;
    let current = current_version.strip_prefix('v').unwrap_or(current_version);

    let release = UpdaterRelease {
        current_version: current.to_string(),
        latest_version: latest,
        resource_url: UPDATER_RESOURCE_PAGE.to_string(),
    };

    if release.is_newer() {
        info!(
            "A newer GeyserUpdater ({}) is available, running {}. Download it from {}",
            release.latest_version, release.current_version, release.resource_url
        );
    } else {
        debug!("GeyserUpdater {} is up to date", release.current_version);
    }
    Ok(release)
}

#[must_use]
pub fn is_newer_version(latest: &str, current: &str) -> bool {
    match (parse_semver(latest), parse_semver(current)) {
        (Some(latest), Some(current)) => latest > current,
        _ => latest != current,
    }
}

fn parse_semver(version: &str) -> Option<Version> {
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().and_then(|part| part.parse::<u64>().ok());
    let patch = parts.next().and_then(|part| part.parse::<u64>().ok());

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticTransport;

    #[test]
    fn two_part_versions_compare_numerically() {
        assert!(is_newer_version("1.7", "1.6.4"));
        assert!(is_newer_version("1.10.0", "1.9"));
        assert!(!is_newer_version("1.6", "1.6.0"));
    }

    #[test]
    fn prerelease_is_older_than_release() {
        assert!(is_newer_version("1.6.4", "1.6.4-SNAPSHOT"));
        assert!(!is_newer_version("1.6.4-SNAPSHOT", "1.6.4"));
    }

    #[test]
    fn unparseable_versions_fall_back_to_inequality() {
        assert!(is_newer_version("nightly", "1.6.4"));
        assert!(!is_newer_version("nightly", "nightly"));
    }

    #[tokio::test]
    async fn version_page_is_trimmed() {
        let transport = StaticTransport::new();
        transport.serve("https://pages.example/version", b"  1.6.4\r\n".to_vec());

        let version = latest_updater_version(&transport, "https://pages.example/version")
            .await
            .expect("version should be accepted");
        assert_eq!(version, "1.6.4");
    }

    #[tokio::test]
    async fn version_page_with_unexpected_content_is_rejected() {
        let transport = StaticTransport::new();
        transport.serve("https://pages.example/version", b"Invalid resource".to_vec());

        let result = latest_updater_version(&transport, "https://pages.example/version").await;
        assert!(matches!(result, Err(OracleError::UnexpectedVersion(text)) if text == "Invalidresource"));
    }

    #[tokio::test]
    async fn check_reports_newer_release() {
        let transport = StaticTransport::new();
        transport.serve(UPDATER_VERSION_URL, b"1.7.0".to_vec());

        let release = check_updater_version(&transport, "v1.6.4")
            .await
            .expect("check should succeed");
        assert!(release.is_newer());
        assert_eq!(release.current_version, "1.6.4");
        assert_eq!(release.resource_url, UPDATER_RESOURCE_PAGE);
    }
}
