mod os;
mod paths;
mod platform;

pub use os::OsFamily;
pub use paths::UpdaterPaths;
pub use platform::{ServerPlatform, StagingConvention, UPDATER_DIR_NAME};
