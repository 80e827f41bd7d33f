use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

/// How long a cached existence result may be served.
pub const EXISTENCE_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy)]
struct CachedExistence {
    exists: bool,
    checked_at: Instant,
}

/// Memoizes file-existence checks for the join hot path.
///
/// Entries are keyed by path. Result and timestamp of an entry are always
/// replaced together under the lock, so readers never see a fresh timestamp
/// paired with a stale result.
#[derive(Debug)]
pub struct ExistenceCache {
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, CachedExistence>>,
}

impl ExistenceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(EXISTENCE_CACHE_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `path` exists. With `allow_cached`, a result younger than the
    /// TTL is returned without touching the filesystem. A fresh check always
    /// refreshes the cached entry.
    pub fn check_exists(&self, path: &Path, allow_cached: bool) -> bool {
        self.check_exists_at(path, allow_cached, Instant::now())
    }

    pub fn check_exists_at(&self, path: &Path, allow_cached: bool, now: Instant) -> bool {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if allow_cached && let Some(entry) = entries.get(path) {
            if now.saturating_duration_since(entry.checked_at) < self.ttl {
                debug!(
                    "Returning cached existence result for {}: {}",
                    path.display(),
                    entry.exists
                );
                return entry.exists;
            }
            debug!(
                "Cached existence result for {} expired, checking again",
                path.display()
            );
        }

        let exists = match path.try_exists() {
            Ok(exists) => exists,
            Err(error) => {
                debug!("Could not check {}: {error}", path.display());
                false
            }
        };
        debug!("Checked whether {} exists: {exists}", path.display());

        entries.insert(
            path.to_path_buf(),
            CachedExistence {
                exists,
                checked_at: now,
            },
        );
        exists
    }
}

impl Default for ExistenceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{EXISTENCE_CACHE_TTL, ExistenceCache};

    #[test]
    fn cached_result_survives_file_changes_within_ttl() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("Geyser-Velocity.jar");
        let cache = ExistenceCache::new();
        let start = Instant::now();

        assert!(!cache.check_exists_at(&path, true, start));
        std::fs::write(&path, b"jar").expect("staged file should be written");

        let later = start + EXISTENCE_CACHE_TTL - Duration::from_secs(1);
        assert!(!cache.check_exists_at(&path, true, later));
    }

    #[test]
    fn cached_result_expires_after_ttl() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("Geyser-Velocity.jar");
        let cache = ExistenceCache::new();
        let start = Instant::now();

        assert!(!cache.check_exists_at(&path, true, start));
        std::fs::write(&path, b"jar").expect("staged file should be written");

        assert!(cache.check_exists_at(&path, true, start + EXISTENCE_CACHE_TTL));
    }

    #[test]
    fn uncached_check_reflects_disk_and_resets_timestamp() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("Geyser-BungeeCord.jar");
        let cache = ExistenceCache::new();
        let start = Instant::now();

        assert!(!cache.check_exists_at(&path, true, start));
        std::fs::write(&path, b"jar").expect("staged file should be written");

        let refreshed_at = start + Duration::from_secs(20 * 60);
        assert!(cache.check_exists_at(&path, false, refreshed_at));

        std::fs::remove_file(&path).expect("staged file should be removable");
        // Past the original entry's TTL but inside the refreshed one.
        let probe = start + EXISTENCE_CACHE_TTL + Duration::from_secs(60);
        assert!(cache.check_exists_at(&path, true, probe));
        assert!(!cache.check_exists_at(&path, false, probe));
    }

    #[test]
    fn entries_are_tracked_per_path() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let present = temp.path().join("present.jar");
        let absent = temp.path().join("absent.jar");
        std::fs::write(&present, b"jar").expect("file should be written");
        let cache = ExistenceCache::with_ttl(Duration::from_secs(60));
        let now = Instant::now();

        assert!(cache.check_exists_at(&present, true, now));
        assert!(!cache.check_exists_at(&absent, true, now));
        assert!(cache.check_exists_at(&present, true, now));
    }

    #[test]
    fn missing_parent_directory_is_not_an_error() {
        let cache = ExistenceCache::new();
        let path = std::env::temp_dir()
            .join("gupdater-missing-parent-dir")
            .join("nested")
            .join("Geyser-Spigot.jar");

        assert!(!cache.check_exists(&path, false));
    }
}
