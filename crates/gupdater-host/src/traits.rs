use async_trait::async_trait;
use std::path::{Path, PathBuf};

use gupdater_platform::ServerPlatform;

use crate::error::HostError;
use crate::types::{Audience, ComponentState, HostCapabilities, InstalledBuild, LaunchCommand};

/// Everything the updater needs from the server it is embedded in.
///
/// Methods that touch live host state (`broadcast`, `restart`, `stop`,
/// `disable_component`) are expected to marshal onto the host's main thread
/// themselves, for example through a [`crate::MainThreadHandle`]. The updater
/// calls them from background tasks.
#[async_trait]
pub trait HostAdapter: Send + Sync {
    fn platform(&self) -> ServerPlatform;

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::for_platform(self.platform())
    }

    /// Version string of the running updater itself.
    fn updater_version(&self) -> &str;

    /// Build identifier and branch of the managed component on disk.
    async fn installed_build(&self) -> Result<InstalledBuild, HostError>;

    fn component_state(&self) -> ComponentState;

    /// Force the managed component to shut down ahead of the updater. Hosts
    /// that order plugin shutdown themselves keep the default.
    async fn disable_component(&self) -> Result<(), HostError> {
        Ok(())
    }

    async fn broadcast(&self, message: &str, audience: Audience);

    async fn restart(&self) -> Result<(), HostError> {
        Err(HostError::Unsupported {
            operation: "restart",
        })
    }

    async fn stop(&self) -> Result<(), HostError>;

    fn launch_command(&self) -> Result<LaunchCommand, HostError> {
        LaunchCommand::current()
            .map_err(|error| HostError::io("failed to capture launch command", error))
    }

    /// Restart script the host is already configured to run, if any.
    fn configured_restart_script(&self) -> Option<PathBuf> {
        None
    }

    /// Point the host's own restart facility at a freshly generated script.
    fn register_restart_script(&self, _script: &Path) -> Result<(), HostError> {
        Ok(())
    }
}
