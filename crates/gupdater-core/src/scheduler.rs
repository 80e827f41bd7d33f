use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gupdater_host::{HostAdapter, HostError};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::build_server::{BuildServer, BuildStatus, OracleError};
use crate::download::{DownloadError, Downloader};
use crate::existence_cache::ExistenceCache;
use crate::target::UpdateTarget;

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const MIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Checking,
    /// Shut down; no further runs start.
    Closed,
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to read the installed build: {0}")]
    Host(#[from] HostError),
    #[error("failed to check for a new build: {0}")]
    Oracle(#[from] OracleError),
}

#[derive(Debug)]
pub enum CheckOutcome {
    /// Another check was already running, or the scheduler is closed.
    Skipped,
    UpToDate(BuildStatus),
    Staged { status: BuildStatus, path: PathBuf },
    DownloadFailed {
        status: BuildStatus,
        error: DownloadError,
    },
    CheckFailed(CheckError),
}

impl CheckOutcome {
    #[must_use]
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }
}

/// Runs check-then-download for one target, never more than one at a time.
pub struct UpdateScheduler {
    host: Arc<dyn HostAdapter>,
    oracle: BuildServer,
    downloader: Downloader,
    target: UpdateTarget,
    cache: Arc<ExistenceCache>,
    checking: AtomicBool,
    closed: AtomicBool,
    idle: Notify,
}

struct CheckingGuard<'a> {
    checking: &'a AtomicBool,
    idle: &'a Notify,
}

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.checking.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

impl UpdateScheduler {
    pub fn new(
        host: Arc<dyn HostAdapter>,
        oracle: BuildServer,
        downloader: Downloader,
        target: UpdateTarget,
        cache: Arc<ExistenceCache>,
    ) -> Self {
        Self {
            host,
            oracle,
            downloader,
            target,
            cache,
            checking: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            idle: Notify::new(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &UpdateTarget {
        &self.target
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.closed.load(Ordering::Acquire) {
            SchedulerState::Closed
        } else if self.checking.load(Ordering::Acquire) {
            SchedulerState::Checking
        } else {
            SchedulerState::Idle
        }
    }

    /// One check. If the installed build is stale the new build is downloaded
    /// to the staging path and the outcome is returned once that download has
    /// resolved.
    pub async fn run_once(&self) -> CheckOutcome {
        if self
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Update check already in progress or closed, skipping");
            return CheckOutcome::Skipped;
        }
        let _guard = CheckingGuard {
            checking: &self.checking,
            idle: &self.idle,
        };

        let status = match self.check().await {
            Ok(status) => status,
            Err(error) => {
                error!("{error}");
                return CheckOutcome::CheckFailed(error);
            }
        };

        if status.is_latest() {
            return CheckOutcome::UpToDate(status);
        }

        info!(
            "Downloading build {} of {}",
            status.latest, status.artifact_name
        );
        let outcome = self
            .downloader
            .download(
                &status.download_url,
                &self.target.staging_path,
                Some(&status.expected_sha256),
            )
            .await;

        let path = match outcome.into_result() {
            Ok(path) => path,
            Err(error) => {
                self.cache.check_exists(&self.target.staging_path, false);
                return CheckOutcome::DownloadFailed { status, error };
            }
        };

        if self.cache.check_exists(&path, false) {
            info!("Staged build {} at {}", status.latest, path.display());
            CheckOutcome::Staged { status, path }
        } else {
            warn!("Downloaded build is missing from {}", path.display());
            CheckOutcome::DownloadFailed {
                status,
                error: DownloadError::Missing(path),
            }
        }
    }

    /// Wait for a run in progress to resolve, then keep every later run from
    /// starting. Once this returns nothing writes to the staging path.
    pub async fn close(&self) {
        loop {
            let idle = self.idle.notified();
            if self
                .checking
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.closed.store(true, Ordering::Release);
                debug!("Update scheduler closed");
                return;
            }
            idle.await;
        }
    }

    async fn check(&self) -> Result<BuildStatus, CheckError> {
        let installed = self.host.installed_build().await?;
        Ok(self.oracle.check(&self.target, &installed).await?)
    }

    /// Run [`UpdateScheduler::run_once`] after `initial_delay` and then every
    /// `interval` until `cancel` fires. Each outcome is handed to `on_outcome`.
    pub fn spawn<F, Fut>(
        self: Arc<Self>,
        initial_delay: Duration,
        interval: Duration,
        cancel: CancellationToken,
        on_outcome: F,
    ) -> JoinHandle<()>
    where
        F: Fn(CheckOutcome) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let on_outcome = Arc::new(on_outcome);
        spawn_periodic(initial_delay, interval, cancel, move || {
            let scheduler = Arc::clone(&self);
            let on_outcome = Arc::clone(&on_outcome);
            async move {
                let outcome = scheduler.run_once().await;
                on_outcome(outcome).await;
            }
        })
    }
}

/// Run `tick` after `initial_delay` and then every `interval` (at least one
/// minute). Ticks that fall behind are skipped rather than bunched up. The
/// loop only observes `cancel` between ticks.
pub fn spawn_periodic<F, Fut>(
    initial_delay: Duration,
    interval: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let interval = interval.max(MIN_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Periodic task cancelled");
                    break;
                }
                _ = ticker.tick() => tick().await,
            }
        }
    })
}
