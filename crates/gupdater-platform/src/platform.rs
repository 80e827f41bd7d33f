/// Name of the updater's own folder under `plugins/`.
pub const UPDATER_DIR_NAME: &str = "GeyserUpdater";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerPlatform {
    Spigot,
    BungeeCord,
    Velocity,
}

/// Where a freshly downloaded artifact waits until it can be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingConvention {
    /// `plugins/update/`. The host swaps the jar in by itself on the next start.
    HostUpdateFolder,
    /// `plugins/GeyserUpdater/BuildUpdate/`. The updater swaps it in on shutdown.
    UpdaterBuildFolder,
}

impl StagingConvention {
    #[must_use]
    pub fn applied_by_host(self) -> bool {
        matches!(self, Self::HostUpdateFolder)
    }
}

impl ServerPlatform {
    pub const ALL: [Self; 3] = [Self::Spigot, Self::BungeeCord, Self::Velocity];

    /// Path segment the build server uses for this platform's download.
    #[must_use]
    pub fn url_component(self) -> &'static str {
        match self {
            Self::Spigot => "spigot",
            Self::BungeeCord => "bungeecord",
            Self::Velocity => "velocity",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Spigot => "Spigot",
            Self::BungeeCord => "BungeeCord",
            Self::Velocity => "Velocity",
        }
    }

    #[must_use]
    pub fn artifact_file_name(self) -> &'static str {
        match self {
            Self::Spigot => "Geyser-Spigot.jar",
            Self::BungeeCord => "Geyser-BungeeCord.jar",
            Self::Velocity => "Geyser-Velocity.jar",
        }
    }

    #[must_use]
    pub fn staging_convention(self) -> StagingConvention {
        match self {
            Self::Spigot => StagingConvention::HostUpdateFolder,
            Self::BungeeCord | Self::Velocity => StagingConvention::UpdaterBuildFolder,
        }
    }

    /// Whether the host can restart itself in-process. Proxies can only stop,
    /// so they depend on a looping restart script instead.
    #[must_use]
    pub fn has_native_restart(self) -> bool {
        matches!(self, Self::Spigot)
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|platform| platform.url_component().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for ServerPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::{ServerPlatform, StagingConvention};

    #[test]
    fn only_spigot_uses_the_host_update_folder() {
        assert_eq!(
            ServerPlatform::Spigot.staging_convention(),
            StagingConvention::HostUpdateFolder
        );
        assert_eq!(
            ServerPlatform::BungeeCord.staging_convention(),
            StagingConvention::UpdaterBuildFolder
        );
        assert_eq!(
            ServerPlatform::Velocity.staging_convention(),
            StagingConvention::UpdaterBuildFolder
        );
        assert!(StagingConvention::HostUpdateFolder.applied_by_host());
        assert!(!StagingConvention::UpdaterBuildFolder.applied_by_host());
    }

    #[test]
    fn native_restart_matches_staging_convention() {
        for platform in ServerPlatform::ALL {
            assert_eq!(
                platform.has_native_restart(),
                platform.staging_convention().applied_by_host()
            );
        }
    }

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(
            ServerPlatform::from_name("BungeeCord"),
            Some(ServerPlatform::BungeeCord)
        );
        assert_eq!(
            ServerPlatform::from_name("velocity"),
            Some(ServerPlatform::Velocity)
        );
        assert_eq!(ServerPlatform::from_name("fabric"), None);
    }
}
