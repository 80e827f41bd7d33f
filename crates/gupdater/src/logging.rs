use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Size above which the updater log is rotated at startup.
pub const DEFAULT_MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// What [`init_logging`] ended up doing with the global logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerInstall {
    /// The updater's own loggers now receive its records.
    Installed,
    /// The host process installed a logger first. Updater records go to it
    /// and its level is left as the host set it.
    HostOwned,
    /// The log file could not be opened and debug output is off, so nothing
    /// was installed.
    Unavailable,
}

/// Move an oversized log aside to `<name>.1`, replacing the previous one.
fn rotate_if_oversized(log_path: &Path, max_log_size: u64) -> Option<PathBuf> {
    let len = std::fs::metadata(log_path).ok()?.len();
    if len <= max_log_size {
        return None;
    }
    let mut rotated = log_path.file_name()?.to_os_string();
    rotated.push(".1");
    let rotated = log_path.with_file_name(rotated);
    std::fs::rename(log_path, &rotated).ok()?;
    Some(rotated)
}

fn open_log_file(log_path: &Path) -> io::Result<File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(log_path)
}

fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Install the updater's logger: an appending log file in the updater
/// directory, mirrored to the server console while `Enable-Debug` is on.
/// Only records from the updater's own crates pass.
///
/// Hosts that own the `log` facade already keep it; see
/// [`LoggerInstall::HostOwned`].
pub fn init_logging(log_path: &Path, debug: bool, max_log_size: u64) -> LoggerInstall {
    let rotated = rotate_if_oversized(log_path, max_log_size);
    let level = level_for(debug);
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .add_filter_allow_str("gupdater")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    let file_error = match open_log_file(log_path) {
        Ok(file) => {
            loggers.push(WriteLogger::new(level, config.clone(), file));
            None
        }
        Err(error) => Some(error),
    };
    if debug {
        loggers.push(TermLogger::new(
            level,
            config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if loggers.is_empty() {
        return LoggerInstall::Unavailable;
    }

    if CombinedLogger::init(loggers).is_err() {
        return LoggerInstall::HostOwned;
    }

    if let Some(rotated) = rotated {
        log::info!("Rotated the previous log to {}", rotated.display());
    }
    if let Some(error) = file_error {
        log::warn!(
            "Could not open {}, logging to the console only: {error}",
            log_path.display()
        );
    }
    log::debug!("Debug logging enabled, log file: {}", log_path.display());
    LoggerInstall::Installed
}
