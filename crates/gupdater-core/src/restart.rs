//! Restarting the host after an update has been staged, and the restart
//! scripts that make a plain stop come back up.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gupdater_host::{Audience, HostAdapter, HostCapabilities, HostError, LaunchCommand};
use gupdater_platform::{OsFamily, UpdaterPaths};
use log::{error, info, warn};
use thiserror::Error;

/// Pause between the restart warning and the restart itself.
pub const RESTART_WARNING_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartStrategy {
    /// The host restarts itself.
    Direct,
    /// The host stops and a looping restart script launches it again.
    ScriptLoop,
}

impl RestartStrategy {
    #[must_use]
    pub fn for_capabilities(capabilities: HostCapabilities) -> Self {
        if capabilities.native_restart {
            Self::Direct
        } else {
            Self::ScriptLoop
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("restart scripts are not supported on {0}")]
    UnsupportedOs(&'static str),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Host(#[from] HostError),
}

impl ScriptError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

impl ScriptOutcome {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::AlreadyExists(path) => path,
        }
    }
}

/// Warn everyone, wait `delay`, then restart or stop the host depending on
/// what it supports.
///
/// # Errors
/// Returns the host's error if the restart or stop is refused. It has
/// already been logged.
pub async fn restart_after_warning(
    host: &dyn HostAdapter,
    message: &str,
    delay: Duration,
) -> Result<RestartStrategy, HostError> {
    let strategy = RestartStrategy::for_capabilities(host.capabilities());

    host.broadcast(message, Audience::Everyone).await;
    tokio::time::sleep(delay).await;

    let result = match strategy {
        RestartStrategy::Direct => {
            info!("Restarting the server to apply the new Geyser build");
            host.restart().await
        }
        RestartStrategy::ScriptLoop => {
            info!("Stopping the server so the restart script can apply the new Geyser build");
            host.stop().await
        }
    };

    match result {
        Ok(()) => Ok(strategy),
        Err(error) => {
            error!("Failed to restart the server: {error}");
            Err(error)
        }
    }
}

/// Render a restart script for `os`. A looping script relaunches the server
/// ten seconds after every exit.
///
/// # Errors
/// Returns [`ScriptError::UnsupportedOs`] for anything but Windows, Linux and
/// macOS.
pub fn render_restart_script(
    os: OsFamily,
    launch: &LaunchCommand,
    looping: bool,
) -> Result<String, ScriptError> {
    let command = launch.command_line();
    let command = command.as_str();
    let lines: Vec<&str> = match (os, looping) {
        (OsFamily::Windows, false) => vec!["@echo off", command],
        (OsFamily::Windows, true) => vec![
            "@echo off",
            ":restart",
            command,
            "echo Server stopped, restarting in 10 seconds",
            "timeout /t 10",
            "goto restart",
        ],
        (os, false) if os.is_posix_supported() => vec!["#!/bin/sh", command],
        (os, true) if os.is_posix_supported() => vec![
            "#!/bin/sh",
            "while true; do",
            command,
            "echo \"Server stopped, restarting in 10 seconds\"; sleep 10; done",
        ],
        (os, _) => return Err(ScriptError::UnsupportedOs(os.display_name())),
    };

    let newline = if os == OsFamily::Windows { "\r\n" } else { "\n" };
    let mut script = lines.join(newline);
    script.push_str(newline);
    Ok(script)
}

/// Write a restart script to `path` unless one is already there. An existing
/// script is never overwritten.
///
/// # Errors
/// Returns an error for unsupported systems or if the file cannot be written.
pub fn generate_restart_script(
    path: &Path,
    os: OsFamily,
    launch: &LaunchCommand,
    looping: bool,
) -> Result<ScriptOutcome, ScriptError> {
    let contents = render_restart_script(os, launch, looping)?;

    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
            return Ok(ScriptOutcome::AlreadyExists(path.to_path_buf()));
        }
        Err(error) => {
            return Err(ScriptError::io(
                "failed to create restart script",
                path,
                error,
            ));
        }
    };

    file.write_all(contents.as_bytes())
        .map_err(|source| ScriptError::io("failed to write restart script", path, source))?;
    make_executable(path)?;

    info!("Created restart script {}", path.display());
    Ok(ScriptOutcome::Created(path.to_path_buf()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ScriptError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        ScriptError::io("failed to make restart script executable", path, source)
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ScriptError> {
    Ok(())
}

/// Make sure the host has a restart script that fits its capabilities.
///
/// Hosts with a native restart keep a script they already have configured.
/// Otherwise a script is generated next to the server and, for those hosts,
/// registered with them.
///
/// # Errors
/// Returns an error for unsupported systems, if the launch command cannot be
/// captured, or if the script cannot be written or registered.
pub fn prepare_restart_script(
    host: &dyn HostAdapter,
    paths: &UpdaterPaths,
    os: OsFamily,
) -> Result<ScriptOutcome, ScriptError> {
    let capabilities = host.capabilities();

    if capabilities.native_restart
        && let Some(configured) = host.configured_restart_script()
    {
        let resolved = paths.root().join(&configured);
        if resolved.is_file() {
            info!(
                "Using the restart script configured by the server: {}",
                resolved.display()
            );
            return Ok(ScriptOutcome::AlreadyExists(resolved));
        }
    }

    let Some(path) = paths.restart_script(os) else {
        warn!(
            "Your operating system ({}) is not supported. Restart scripts can only be generated for Linux, macOS and Windows",
            os.display_name()
        );
        return Err(ScriptError::UnsupportedOs(os.display_name()));
    };

    let launch = host.launch_command()?;
    let looping = capabilities.needs_looping_script();
    let outcome = generate_restart_script(&path, os, &launch, looping)?;

    if capabilities.native_restart {
        host.register_restart_script(&path)?;
        info!("Registered restart script {}", path.display());
    } else if matches!(outcome, ScriptOutcome::Created(_)) {
        warn!(
            "Stop the server and start it again with {} for automatic restarts to work",
            path.display()
        );
    }

    Ok(outcome)
}
