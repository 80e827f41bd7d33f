use std::ffi::OsString;
use std::path::PathBuf;

use gupdater_platform::{ServerPlatform, StagingConvention};

/// Permission a player needs to receive update notices and run the command.
pub const UPDATE_PERMISSION: &str = "gupdater.geyserupdate";

/// Lifecycle state of the managed component as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Running,
    ShuttingDown,
    Disabled,
}

impl ComponentState {
    /// The jar may only be overwritten once nothing holds it open.
    #[must_use]
    pub fn allows_replacement(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    /// Only players holding [`UPDATE_PERMISSION`].
    Privileged,
}

/// Build of the managed component currently loaded by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledBuild {
    pub build: String,
    pub branch: String,
}

impl InstalledBuild {
    pub fn new(build: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            build: build.into(),
            branch: branch.into(),
        }
    }
}

/// What the host declares it can do, fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub native_restart: bool,
    pub staging: StagingConvention,
}

impl HostCapabilities {
    #[must_use]
    pub fn for_platform(platform: ServerPlatform) -> Self {
        Self {
            native_restart: platform.has_native_restart(),
            staging: platform.staging_convention(),
        }
    }

    /// A restart script has to loop exactly when the host cannot restart itself.
    #[must_use]
    pub fn needs_looping_script(self) -> bool {
        !self.native_restart
    }
}

/// Program and arguments that relaunch the host process the way it was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Capture the launch command of the running process.
    ///
    /// # Errors
    /// Returns an error if the current executable path cannot be resolved.
    pub fn current() -> std::io::Result<Self> {
        let program = std::env::current_exe()?;
        let args = std::env::args_os()
            .skip(1)
            .map(|arg: OsString| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        Ok(Self { program, args })
    }

    /// Render as a single command line, quoting parts that contain whitespace.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| quote_if_needed(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_if_needed(part: &str) -> String {
    if part.is_empty() || part.contains(char::is_whitespace) {
        format!("\"{part}\"")
    } else {
        part.to_string()
    }
}
