use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::translate_color_codes;

pub const CURRENT_CONFIG_VERSION: u32 = 2;

/// Longest accepted `Auto-Update-Interval`, one year in hours.
pub const MAX_UPDATE_INTERVAL_HOURS: u64 = 365 * 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize the default config: {0}")]
    Serialize(String),
    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(rename = "Enable-Debug", default)]
    pub enable_debug: bool,

    /// Reads as 0 when the key is missing so old files are flagged.
    #[serde(rename = "Config-Version", default)]
    pub config_version: u32,

    #[serde(rename = "Auto-Script-Generating", default = "default_true")]
    pub auto_script_generating: bool,

    #[serde(rename = "Auto-Update-Geyser", default = "default_true")]
    pub auto_update_geyser: bool,

    /// Hours between checks.
    #[serde(rename = "Auto-Update-Interval", default = "default_update_interval")]
    pub auto_update_interval: i64,

    #[serde(rename = "Auto-Restart-Server", default)]
    pub auto_restart_server: bool,

    #[serde(rename = "Restart-Message-Players", default = "default_restart_message")]
    pub restart_message_players: String,
}

fn default_true() -> bool {
    true
}

fn default_update_interval() -> i64 {
    24
}

fn default_restart_message() -> String {
    "The server will restart in 10 seconds!".to_string()
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            enable_debug: false,
            config_version: CURRENT_CONFIG_VERSION,
            auto_script_generating: default_true(),
            auto_update_geyser: default_true(),
            auto_update_interval: default_update_interval(),
            auto_restart_server: false,
            restart_message_players: default_restart_message(),
        }
    }
}

impl UpdaterConfig {
    /// Load the config at `path`, writing the defaults there first if the
    /// file does not exist. The format follows the file extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, written or parsed, or if
    /// its extension is neither YAML nor TOML.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

        if !path.exists() {
            let config = Self::default();
            config.save(path, format)?;
            info!("Wrote default config to {}", path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            context: "failed to read config",
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path, format)
    }

    /// # Errors
    /// Returns an error if `content` is not a valid config in `format`.
    pub fn parse(content: &str, path: &Path, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Yaml if content.trim().is_empty() => Ok(Self {
                config_version: 0,
                ..Self::default()
            }),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|source| {
                ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source,
                }
            }),
            ConfigFormat::Toml => toml::from_str(content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn save(&self, path: &Path, format: ConfigFormat) -> Result<(), ConfigError> {
        let content = match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|error| ConfigError::Serialize(error.to_string()))?,
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|error| ConfigError::Serialize(error.to_string()))?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                context: "failed to create config directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            context: "failed to write config",
            path: path.to_path_buf(),
            source,
        })
    }

    /// Warn if the file was written for another config layout. Nothing is
    /// migrated.
    pub fn check_version(&self) -> bool {
        if self.config_version == CURRENT_CONFIG_VERSION {
            return true;
        }
        warn!(
            "Your copy of config.yml is outdated (version {}, expected {CURRENT_CONFIG_VERSION}). Please delete it and let a fresh copy of config.yml be regenerated!",
            self.config_version
        );
        false
    }

    /// Interval between scheduled checks, or `None` when scheduling is
    /// switched off by a non-positive value. Values above
    /// [`MAX_UPDATE_INTERVAL_HOURS`] are clamped to it.
    #[must_use]
    pub fn update_interval(&self) -> Option<Duration> {
        let hours = u64::try_from(self.auto_update_interval).ok()?;
        if hours == 0 {
            return None;
        }
        let hours = if hours > MAX_UPDATE_INTERVAL_HOURS {
            warn!(
                "Auto-Update-Interval of {hours} hours is too long, using {MAX_UPDATE_INTERVAL_HOURS} hours instead"
            );
            MAX_UPDATE_INTERVAL_HOURS
        } else {
            hours
        };
        Some(Duration::from_secs(hours * 60 * 60))
    }

    /// The restart broadcast with `&` colour codes translated.
    #[must_use]
    pub fn restart_message(&self) -> String {
        translate_color_codes(&self.restart_message_players)
    }
}
