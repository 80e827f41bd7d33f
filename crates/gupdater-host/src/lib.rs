mod dispatch;
mod error;
mod traits;
mod types;

pub use dispatch::{MainThreadHandle, MainThreadQueue, MainThreadTask};
pub use error::HostError;
pub use traits::HostAdapter;
pub use types::{
    Audience, ComponentState, HostCapabilities, InstalledBuild, LaunchCommand, UPDATE_PERMISSION,
};
