use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gupdater_host::ComponentState;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::target::UpdateTarget;

pub const DELETE_ATTEMPTS: u32 = 3;
pub const DELETE_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("refusing to replace {} while the component is still running", live.display())]
    ComponentActive { live: PathBuf },
    #[error("failed to copy {} over {}: {source}", staging.display(), live.display())]
    Copy {
        staging: PathBuf,
        live: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
#[error("failed to delete {} after {attempts} attempts: {source}", path.display())]
pub struct RetryExhausted {
    pub path: PathBuf,
    pub attempts: u32,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementOutcome {
    NothingStaged,
    Replaced {
        bytes_copied: u64,
        staging_removed: bool,
    },
}

/// Moves a staged artifact over the live one during host shutdown.
#[derive(Debug, Clone)]
pub struct StagedReplacement {
    staging: PathBuf,
    live: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

impl StagedReplacement {
    pub fn new(staging: impl Into<PathBuf>, live: impl Into<PathBuf>) -> Self {
        Self {
            staging: staging.into(),
            live: live.into(),
            attempts: DELETE_ATTEMPTS,
            retry_delay: DELETE_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn for_target(target: &UpdateTarget) -> Self {
        Self::new(&target.staging_path, &target.live_path)
    }

    #[must_use]
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Replace using a blocking sleep between deletion attempts. Call from a
    /// blocking context.
    ///
    /// # Errors
    /// See [`StagedReplacement::replace_with_delay`].
    pub fn replace(&self, state: ComponentState) -> Result<ReplacementOutcome, ReplaceError> {
        self.replace_with_delay(state, std::thread::sleep)
    }

    /// Copy the staged file over the live one, then delete the staged file.
    ///
    /// Nothing staged is a successful no-op. Failing to delete the staged
    /// file afterwards is logged and reported in the outcome, not returned
    /// as an error.
    ///
    /// # Errors
    /// [`ReplaceError::ComponentActive`] if `state` is still running, and
    /// [`ReplaceError::Copy`] if the copy fails, in which case the live file
    /// is left as it was.
    pub fn replace_with_delay(
        &self,
        state: ComponentState,
        delay: impl FnMut(Duration),
    ) -> Result<ReplacementOutcome, ReplaceError> {
        self.replace_with(state, delay, |path| std::fs::remove_file(path))
    }

    fn replace_with(
        &self,
        state: ComponentState,
        delay: impl FnMut(Duration),
        remove: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<ReplacementOutcome, ReplaceError> {
        if !self.staging.is_file() {
            debug!("No staged build at {}", self.staging.display());
            return Ok(ReplacementOutcome::NothingStaged);
        }

        if !state.allows_replacement() {
            error!(
                "Not replacing {}: the managed component is still running",
                self.live.display()
            );
            return Err(ReplaceError::ComponentActive {
                live: self.live.clone(),
            });
        }

        let bytes_copied = copy_over(&self.staging, &self.live).map_err(|source| {
            error!(
                "Failed to move {} to {}: {source}",
                self.staging.display(),
                self.live.display()
            );
            ReplaceError::Copy {
                staging: self.staging.clone(),
                live: self.live.clone(),
                source,
            }
        })?;
        info!(
            "Replaced {} with the staged build ({bytes_copied} bytes)",
            self.live.display()
        );

        let staging_removed = match remove_with(
            &self.staging,
            self.attempts,
            self.retry_delay,
            delay,
            remove,
        ) {
            Ok(()) => true,
            Err(exhausted) => {
                error!("{exhausted}");
                false
            }
        };

        Ok(ReplacementOutcome::Replaced {
            bytes_copied,
            staging_removed,
        })
    }
}

/// Copy to a sibling temporary file and rename it over `live`, so a failed
/// copy never leaves a truncated live file.
fn copy_over(staging: &Path, live: &Path) -> io::Result<u64> {
    if let Some(parent) = live.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut temp_name = live.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp = live.with_file_name(temp_name);

    let result = std::fs::copy(staging, &temp).and_then(|bytes| {
        std::fs::rename(&temp, live)?;
        Ok(bytes)
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

/// Delete `path`, trying up to `attempts` times with `retry_delay` between
/// attempts. A file that is already gone counts as deleted.
fn remove_with(
    path: &Path,
    attempts: u32,
    retry_delay: Duration,
    mut delay: impl FnMut(Duration),
    mut remove: impl FnMut(&Path) -> io::Result<()>,
) -> Result<(), RetryExhausted> {
    let mut attempt = 1;
    loop {
        match remove(path) {
            Ok(()) => {
                debug!("Deleted {} on attempt {attempt}", path.display());
                return Ok(());
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) if attempt >= attempts => {
                return Err(RetryExhausted {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: error,
                });
            }
            Err(error) => {
                warn!(
                    "Failed to delete {} (attempt {attempt}/{attempts}): {error}",
                    path.display()
                );
                delay(retry_delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;
    use std::time::Duration;

    use gupdater_host::ComponentState;

    use super::{
        DELETE_ATTEMPTS, DELETE_RETRY_DELAY, ReplaceError, ReplacementOutcome, StagedReplacement,
        remove_with,
    };

    #[test]
    fn replacement_copies_staged_bytes_and_removes_staging() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let staging = temp
            .path()
            .join("plugins/GeyserUpdater/BuildUpdate/Geyser-Velocity.jar");
        let live = temp.path().join("plugins/Geyser-Velocity.jar");
        std::fs::create_dir_all(staging.parent().expect("parent")).expect("staging dir");
        std::fs::write(&staging, b"build 101").expect("staged jar");
        std::fs::write(&live, b"build 100 with more bytes").expect("live jar");

        let outcome = StagedReplacement::new(&staging, &live)
            .replace_with_delay(ComponentState::Disabled, |_| {})
            .expect("replacement should succeed");

        assert_eq!(
            outcome,
            ReplacementOutcome::Replaced {
                bytes_copied: 9,
                staging_removed: true
            }
        );
        assert_eq!(std::fs::read(&live).expect("live jar"), b"build 101");
        assert!(!staging.exists());
        assert!(!temp.path().join("plugins/Geyser-Velocity.jar.tmp").exists());
    }

    #[test]
    fn nothing_staged_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let live = temp.path().join("Geyser-Velocity.jar");
        std::fs::write(&live, b"build 100").expect("live jar");

        let outcome = StagedReplacement::new(temp.path().join("missing.jar"), &live)
            .replace_with_delay(ComponentState::Disabled, |_| {})
            .expect("no-op should succeed");

        assert_eq!(outcome, ReplacementOutcome::NothingStaged);
        assert_eq!(std::fs::read(&live).expect("live jar"), b"build 100");
    }

    #[test]
    fn running_component_aborts_without_touching_files() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let staging = temp.path().join("staged.jar");
        let live = temp.path().join("live.jar");
        std::fs::write(&staging, b"new").expect("staged jar");
        std::fs::write(&live, b"old").expect("live jar");

        let result = StagedReplacement::new(&staging, &live)
            .replace_with_delay(ComponentState::Running, |_| {});

        assert!(matches!(result, Err(ReplaceError::ComponentActive { .. })));
        assert_eq!(std::fs::read(&live).expect("live jar"), b"old");
        assert!(staging.exists());
    }

    #[test]
    fn undeletable_staging_is_reported_after_the_swap() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let staging = temp.path().join("staged.jar");
        let live = temp.path().join("live.jar");
        std::fs::write(&staging, b"build 101").expect("staged jar");
        std::fs::write(&live, b"build 100").expect("live jar");
        let attempts = Cell::new(0);
        let delays = Cell::new(0);

        let outcome = StagedReplacement::new(&staging, &live)
            .replace_with(
                ComponentState::Disabled,
                |_| delays.set(delays.get() + 1),
                |_| {
                    attempts.set(attempts.get() + 1);
                    Err(io::Error::from(io::ErrorKind::PermissionDenied))
                },
            )
            .expect("a stuck staging file is not an error");

        assert_eq!(
            outcome,
            ReplacementOutcome::Replaced {
                bytes_copied: 9,
                staging_removed: false
            }
        );
        assert_eq!(std::fs::read(&live).expect("live jar"), b"build 101");
        assert!(staging.exists());
        assert_eq!(attempts.get(), 3);
        assert_eq!(delays.get(), 2);
    }

    #[test]
    fn deletion_stops_after_exactly_three_attempts() {
        let attempts = Cell::new(0);
        let delays = Cell::new(0);

        let result = remove_with(
            std::path::Path::new("staged.jar"),
            DELETE_ATTEMPTS,
            DELETE_RETRY_DELAY,
            |delay| {
                assert_eq!(delay, Duration::from_millis(50));
                delays.set(delays.get() + 1);
            },
            |_| {
                attempts.set(attempts.get() + 1);
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            },
        );

        let exhausted = result.expect_err("deletion should give up");
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(attempts.get(), 3);
        assert_eq!(delays.get(), 2);
    }

    #[test]
    fn deletion_succeeds_on_a_later_attempt() {
        let attempts = Cell::new(0);

        let result = remove_with(
            std::path::Path::new("staged.jar"),
            DELETE_ATTEMPTS,
            DELETE_RETRY_DELAY,
            |_| {},
            |_| {
                attempts.set(attempts.get() + 1);
                if attempts.get() < 2 {
                    Err(io::Error::from(io::ErrorKind::PermissionDenied))
                } else {
                    Ok(())
                }
            },
        );

        assert!(result.is_ok());
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn failed_copy_leaves_live_file_intact() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let staging = temp.path().join("staged.jar");
        std::fs::write(&staging, b"new").expect("staged jar");
        // A directory at the live path cannot be replaced by a file rename.
        let live = temp.path().join("live.jar");
        std::fs::create_dir(&live).expect("live dir");
        std::fs::write(live.join("marker"), b"keep").expect("marker");

        let result = StagedReplacement::new(&staging, &live)
            .replace_with_delay(ComponentState::ShuttingDown, |_| {});

        assert!(matches!(result, Err(ReplaceError::Copy { .. })));
        assert!(live.join("marker").exists());
        assert!(staging.exists());
    }
}
