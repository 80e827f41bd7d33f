use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use gupdater_core::restart::{RESTART_WARNING_DELAY, prepare_restart_script, restart_after_warning};
use gupdater_core::{
    BuildServer, CheckOutcome, DEFAULT_DOWNLOAD_URL_TEMPLATE, DEFAULT_INITIAL_DELAY,
    DEFAULT_METADATA_URL_TEMPLATE, Downloader, ExistenceCache, HttpTransport, ReplaceError,
    ReplacementOutcome, ReqwestTransport, SchedulerState, StagedReplacement, TransportError,
    UpdateScheduler, UpdateTarget, check_updater_version, spawn_periodic,
};
use gupdater_host::{Audience, HostAdapter};
use gupdater_platform::{OsFamily, UpdaterPaths};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, UpdaterConfig};
use crate::logging::{DEFAULT_MAX_LOG_SIZE, LoggerInstall, init_logging};
use crate::messages::{
    ALREADY_LATEST, RESTART_PENDING, RESTART_WARNING_LOG, UPDATE_FAILED, UPDATE_STAGED, colored,
};

pub const REMINDER_DELAY: Duration = Duration::from_secs(30 * 60);
pub const REMINDER_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("failed to load the updater config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to set up the HTTP client: {0}")]
    Transport(#[from] TransportError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Knobs the embedding host may override. Defaults follow the plugin's
/// historical timings.
#[derive(Debug, Clone)]
pub struct UpdaterOptions {
    pub paths: UpdaterPaths,
    pub os: OsFamily,
    pub metadata_url_template: String,
    pub download_url_template: String,
    pub initial_delay: Duration,
    pub reminder_delay: Duration,
    pub reminder_interval: Duration,
    pub restart_delay: Duration,
    pub check_updater_version: bool,
}

impl UpdaterOptions {
    #[must_use]
    pub fn new(paths: UpdaterPaths) -> Self {
        Self {
            paths,
            os: OsFamily::current(),
            metadata_url_template: DEFAULT_METADATA_URL_TEMPLATE.to_string(),
            download_url_template: DEFAULT_DOWNLOAD_URL_TEMPLATE.to_string(),
            initial_delay: DEFAULT_INITIAL_DELAY,
            reminder_delay: REMINDER_DELAY,
            reminder_interval: REMINDER_INTERVAL,
            restart_delay: RESTART_WARNING_DELAY,
            check_updater_version: true,
        }
    }
}

#[derive(Debug)]
pub enum ShutdownOutcome {
    /// The host installs staged builds itself on its next start.
    AppliedByHost,
    Applied(ReplacementOutcome),
    Failed(ReplaceError),
    /// The replacement task panicked or was cancelled.
    Interrupted,
}

/// The updater for one host process. Construct once at enable time and keep
/// it until shutdown.
pub struct Updater {
    host: Arc<dyn HostAdapter>,
    config: UpdaterConfig,
    options: UpdaterOptions,
    transport: Arc<dyn HttpTransport>,
    scheduler: Arc<UpdateScheduler>,
    cache: Arc<ExistenceCache>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Updater {
    pub fn new(
        host: Arc<dyn HostAdapter>,
        transport: Arc<dyn HttpTransport>,
        config: UpdaterConfig,
        options: UpdaterOptions,
    ) -> Arc<Self> {
        let target = UpdateTarget::for_platform(host.platform(), &options.paths)
            .with_url_templates(
                options.metadata_url_template.clone(),
                options.download_url_template.clone(),
            );
        let cache = Arc::new(ExistenceCache::new());
        let scheduler = Arc::new(UpdateScheduler::new(
            Arc::clone(&host),
            BuildServer::new(Arc::clone(&transport)),
            Downloader::new(Arc::clone(&transport)),
            target,
            Arc::clone(&cache),
        ));

        Arc::new(Self {
            host,
            config,
            options,
            transport,
            scheduler,
            cache,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Load the config next to the server, start logging, build the HTTP
    /// client and enable the updater. Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the updater directory, the config or the HTTP
    /// client cannot be set up.
    pub fn bootstrap(
        host: Arc<dyn HostAdapter>,
        paths: UpdaterPaths,
    ) -> Result<Arc<Self>, UpdaterError> {
        paths.ensure_dirs().map_err(|source| UpdaterError::Io {
            context: "failed to create the updater directory",
            source,
        })?;
        let config = UpdaterConfig::load_or_create(&paths.config_file(host.platform()))?;
        let install = init_logging(&paths.log_file(), config.enable_debug, DEFAULT_MAX_LOG_SIZE);
        if install == LoggerInstall::HostOwned {
            info!("Logging through the server's existing logger");
        }

        let transport = Arc::new(ReqwestTransport::with_defaults(host.updater_version())?);
        let updater = Self::new(host, transport, config, UpdaterOptions::new(paths));
        updater.enable();
        Ok(updater)
    }

    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    #[must_use]
    pub fn target(&self) -> &UpdateTarget {
        self.scheduler.target()
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Start the background work: the updater self-check, restart script
    /// generation, the scheduled update checks and the pending-update
    /// reminder. Must be called inside a tokio runtime.
    pub fn enable(self: &Arc<Self>) {
        self.config.check_version();

        if self.options.check_updater_version {
            let transport = Arc::clone(&self.transport);
            let host = Arc::clone(&self.host);
            self.track(tokio::spawn(async move {
                if let Err(error) =
                    check_updater_version(transport.as_ref(), host.updater_version()).await
                {
                    warn!("Failed to check for a newer GeyserUpdater: {error}");
                }
            }));
        }

        if self.config.auto_script_generating
            && let Err(error) =
                prepare_restart_script(self.host.as_ref(), &self.options.paths, self.options.os)
        {
            error!("Failed to prepare the restart script: {error}");
        }

        if self.config.auto_update_geyser {
            match self.config.update_interval() {
                Some(interval) => {
                    let weak = Arc::downgrade(self);
                    let handle = Arc::clone(&self.scheduler).spawn(
                        self.options.initial_delay,
                        interval,
                        self.cancel.child_token(),
                        move |outcome| handle_scheduled(weak.clone(), outcome),
                    );
                    self.track(handle);
                    info!(
                        "Checking for new Geyser builds every {} hour(s)",
                        interval.as_secs() / 3600
                    );
                }
                None => warn!(
                    "Auto-Update-Interval is {}; scheduled update checks are disabled",
                    self.config.auto_update_interval
                ),
            }
        }

        let cache = Arc::clone(&self.cache);
        let staging = self.target().staging_path.clone();
        self.track(spawn_periodic(
            self.options.reminder_delay,
            self.options.reminder_interval,
            self.cancel.child_token(),
            move || {
                if cache.check_exists(&staging, false) {
                    info!("{RESTART_PENDING}");
                }
                std::future::ready(())
            },
        ));
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(handle);
    }

    /// Notice for a player who just joined, if they may act on it and a
    /// staged build is waiting. Uses the cached existence check.
    #[must_use]
    pub fn pending_update_notice(&self, privileged: bool) -> Option<String> {
        if privileged && self.cache.check_exists(&self.target().staging_path, true) {
            Some(colored('a', RESTART_PENDING))
        } else {
            None
        }
    }

    /// Run a check and download right away, as the update command does.
    pub async fn trigger_update(&self) -> CheckOutcome {
        let outcome = self.scheduler.run_once().await;
        self.handle_outcome(&outcome).await;
        outcome
    }

    /// Reply for whoever ran the update command.
    #[must_use]
    pub fn command_reply(outcome: &CheckOutcome) -> String {
        match outcome {
            CheckOutcome::Skipped => colored('e', "An update check is already running."),
            CheckOutcome::UpToDate(_) => colored('a', ALREADY_LATEST),
            CheckOutcome::Staged { .. } => colored('a', UPDATE_STAGED),
            CheckOutcome::DownloadFailed { .. } | CheckOutcome::CheckFailed(_) => {
                colored('c', UPDATE_FAILED)
            }
        }
    }

    async fn handle_outcome(&self, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Staged { .. } => {
                info!("{UPDATE_STAGED}");
                self.host
                    .broadcast(&colored('a', UPDATE_STAGED), Audience::Privileged)
                    .await;
                if self.config.auto_restart_server {
                    warn!("{RESTART_WARNING_LOG}");
                    match restart_after_warning(
                        self.host.as_ref(),
                        &self.config.restart_message(),
                        self.options.restart_delay,
                    )
                    .await
                    {
                        Ok(strategy) => debug!("Server shutdown requested ({strategy:?})"),
                        Err(error) => {
                            debug!("Automatic restart abandoned (already reported): {error}");
                        }
                    }
                }
            }
            CheckOutcome::DownloadFailed { error, .. } => {
                error!("Failed to download the latest build of Geyser: {error}");
                self.host
                    .broadcast(&colored('c', UPDATE_FAILED), Audience::Privileged)
                    .await;
            }
            CheckOutcome::UpToDate(status) => {
                debug!("Geyser build {} is up to date", status.current);
            }
            CheckOutcome::CheckFailed(_) | CheckOutcome::Skipped => {}
        }
    }

    /// Stop background work and, where the updater owns staging, move the
    /// staged build over the live one. Call from the host's disable hook.
    ///
    /// A download still in flight is allowed to resolve first, so only a
    /// verified build is ever swapped in.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        self.cancel.cancel();
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        if self.scheduler.state() == SchedulerState::Checking {
            info!("Waiting for the running update check before shutting down");
        }
        self.scheduler.close().await;

        if self.host.capabilities().staging.applied_by_host() {
            return ShutdownOutcome::AppliedByHost;
        }

        if let Err(error) = self.host.disable_component().await {
            warn!("Failed to disable Geyser ahead of the update: {error}");
        }
        let state = self.host.component_state();
        let replacement = StagedReplacement::for_target(self.target());

        match tokio::task::spawn_blocking(move || replacement.replace(state)).await {
            Ok(Ok(outcome)) => ShutdownOutcome::Applied(outcome),
            Ok(Err(error)) => ShutdownOutcome::Failed(error),
            Err(error) => {
                error!("Staged build replacement did not finish: {error}");
                ShutdownOutcome::Interrupted
            }
        }
    }
}

async fn handle_scheduled(updater: Weak<Updater>, outcome: CheckOutcome) {
    if let Some(updater) = updater.upgrade() {
        updater.handle_outcome(&outcome).await;
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
