use std::path::PathBuf;

use gupdater_platform::{ServerPlatform, UpdaterPaths};

pub const DEFAULT_METADATA_URL_TEMPLATE: &str =
    "https://download.geysermc.org/v2/projects/geyser/versions/latest/builds/latest";

pub const DEFAULT_DOWNLOAD_URL_TEMPLATE: &str =
    "https://download.geysermc.org/v2/projects/geyser/versions/latest/builds/latest/downloads/{platform}";

/// The one artifact an installation manages. `{platform}` and `{branch}` in
/// the URL templates are substituted per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    pub platform: ServerPlatform,
    pub metadata_url_template: String,
    pub download_url_template: String,
    pub staging_path: PathBuf,
    pub live_path: PathBuf,
}

impl UpdateTarget {
    #[must_use]
    pub fn for_platform(platform: ServerPlatform, paths: &UpdaterPaths) -> Self {
        Self {
            platform,
            metadata_url_template: DEFAULT_METADATA_URL_TEMPLATE.to_string(),
            download_url_template: DEFAULT_DOWNLOAD_URL_TEMPLATE.to_string(),
            staging_path: paths.staging_file(platform),
            live_path: paths.live_file(platform),
        }
    }

    #[must_use]
    pub fn with_url_templates(
        mut self,
        metadata_url_template: impl Into<String>,
        download_url_template: impl Into<String>,
    ) -> Self {
        self.metadata_url_template = metadata_url_template.into();
        self.download_url_template = download_url_template.into();
        self
    }

    #[must_use]
    pub fn metadata_url(&self, branch: &str) -> String {
        expand_template(&self.metadata_url_template, self.platform, branch)
    }

    #[must_use]
    pub fn download_url(&self, branch: &str) -> String {
        expand_template(&self.download_url_template, self.platform, branch)
    }
}

fn expand_template(template: &str, platform: ServerPlatform, branch: &str) -> String {
    template
        .replace("{platform}", platform.url_component())
        .replace("{branch}", branch)
}
