//! Embedding surface of the updater: configuration, logging and the
//! [`Updater`] context a host adapter drives through its lifecycle hooks.
//!
//! A host wires its hooks like this:
//! - plugin enable: [`Updater::bootstrap`]
//! - player join: [`Updater::pending_update_notice`]
//! - the `geyserupdate` command: [`Updater::trigger_update`] and [`Updater::command_reply`]
//! - plugin disable: [`Updater::shutdown`]

pub mod config;
pub mod logging;
pub mod messages;
mod updater;

pub use config::{
    CURRENT_CONFIG_VERSION, ConfigError, ConfigFormat, MAX_UPDATE_INTERVAL_HOURS, UpdaterConfig,
};
pub use updater::{
    REMINDER_DELAY, REMINDER_INTERVAL, ShutdownOutcome, Updater, UpdaterError, UpdaterOptions,
};
