//! Update workflow for a single managed Geyser artifact.
//!
//! The pieces, leaves first:
//! - [`ExistenceCache`]: time-boxed memo of "is a staged build waiting?".
//! - [`Downloader`]: streams an artifact to disk and verifies its SHA-256.
//! - [`BuildServer`]: asks the build server whether the installed build is current.
//! - [`UpdateScheduler`]: runs check-then-download on an interval, one run at a time.
//! - [`StagedReplacement`]: swaps the staged jar in during host shutdown.
//! - [`restart`]: restart orchestration and restart-script generation.

mod build_server;
mod download;
mod existence_cache;
pub mod restart;
mod replace;
mod scheduler;
mod target;
mod transport;
mod updater_version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use build_server::{BuildMetadata, BuildServer, BuildStatus, DownloadEntry, OracleError};
pub use download::{DownloadError, DownloadOutcome, Downloader, sha256_file, sha256_hex};
pub use existence_cache::{EXISTENCE_CACHE_TTL, ExistenceCache};
pub use replace::{
    DELETE_ATTEMPTS, DELETE_RETRY_DELAY, ReplaceError, ReplacementOutcome, RetryExhausted,
    StagedReplacement,
};
pub use scheduler::{
    CheckError, CheckOutcome, DEFAULT_CHECK_INTERVAL, DEFAULT_INITIAL_DELAY, SchedulerState,
    UpdateScheduler, spawn_periodic,
};
pub use target::{DEFAULT_DOWNLOAD_URL_TEMPLATE, DEFAULT_METADATA_URL_TEMPLATE, UpdateTarget};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
pub use updater_version::{
    UPDATER_RESOURCE_PAGE, UPDATER_VERSION_URL, UpdaterRelease, check_updater_version,
    is_newer_version, latest_updater_version,
};
