use std::path::{Path, PathBuf};

use crate::os::OsFamily;
use crate::platform::{ServerPlatform, StagingConvention, UPDATER_DIR_NAME};

/// Filesystem layout of one server installation, rooted at the directory the
/// host process was launched from.
#[derive(Debug, Clone)]
pub struct UpdaterPaths {
    pub root: PathBuf,
    pub plugins_dir: PathBuf,
    pub updater_dir: PathBuf,
}

impl UpdaterPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let plugins_dir = root.join("plugins");
        let updater_dir = plugins_dir.join(UPDATER_DIR_NAME);
        Self {
            root,
            plugins_dir,
            updater_dir,
        }
    }

    #[must_use]
    pub fn staging_dir(&self, convention: StagingConvention) -> PathBuf {
        match convention {
            StagingConvention::HostUpdateFolder => self.plugins_dir.join("update"),
            StagingConvention::UpdaterBuildFolder => self.updater_dir.join("BuildUpdate"),
        }
    }

    #[must_use]
    pub fn staging_file(&self, platform: ServerPlatform) -> PathBuf {
        self.staging_dir(platform.staging_convention())
            .join(platform.artifact_file_name())
    }

    #[must_use]
    pub fn live_file(&self, platform: ServerPlatform) -> PathBuf {
        self.plugins_dir.join(platform.artifact_file_name())
    }

    /// Restart script location, or `None` when no script format exists for
    /// the operating system.
    #[must_use]
    pub fn restart_script(&self, os: OsFamily) -> Option<PathBuf> {
        restart_script_name(os).map(|name| self.root.join(name))
    }

    /// The updater config. Proxies of the Velocity family use TOML, the rest YAML.
    #[must_use]
    pub fn config_file(&self, platform: ServerPlatform) -> PathBuf {
        match platform {
            ServerPlatform::Velocity => self.updater_dir.join("config.toml"),
            ServerPlatform::Spigot | ServerPlatform::BungeeCord => {
                self.updater_dir.join("config.yml")
            }
        }
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.updater_dir.join("updater.log")
    }

    /// Ensure the updater directory exists on disk.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.updater_dir)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn restart_script_name(os: OsFamily) -> Option<&'static str> {
    match os {
        OsFamily::Windows => Some("ServerRestartScript.bat"),
        OsFamily::Linux | OsFamily::MacOs => Some("ServerRestartScript.sh"),
        OsFamily::Other => None,
    }
}
