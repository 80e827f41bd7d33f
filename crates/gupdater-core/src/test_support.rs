//! In-memory stand-ins for the network and the host, for tests in this crate
//! and in crates that enable the `test-utils` feature.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use gupdater_host::{
    Audience, ComponentState, HostAdapter, HostCapabilities, HostError, InstalledBuild,
    LaunchCommand,
};
use gupdater_platform::ServerPlatform;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::transport::{HttpTransport, TransportError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Clone)]
enum Route {
    Body(Vec<u8>),
    Status(u16),
    FailAfter(Vec<u8>),
}

/// Lets a test observe that a download started and decide when it proceeds.
#[derive(Debug, Clone, Default)]
pub struct DownloadGate {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct TransportState {
    routes: HashMap<String, Route>,
    requests: Vec<String>,
    gate: Option<DownloadGate>,
}

/// Serves fixed responses by exact URL. Unknown URLs answer HTTP 404.
#[derive(Clone, Default)]
pub struct StaticTransport {
    state: Arc<Mutex<TransportState>>,
}

impl StaticTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        lock(&self.state)
            .routes
            .insert(url.to_string(), Route::Body(body));
    }

    pub fn respond_status(&self, url: &str, status: u16) {
        lock(&self.state)
            .routes
            .insert(url.to_string(), Route::Status(status));
    }

    /// Write `partial` and then fail, like a connection dropped mid-body.
    pub fn fail_after_partial(&self, url: &str, partial: Vec<u8>) {
        lock(&self.state)
            .routes
            .insert(url.to_string(), Route::FailAfter(partial));
    }

    /// Hold every subsequent download until the returned gate is released.
    #[must_use]
    pub fn hold_downloads(&self) -> DownloadGate {
        let gate = DownloadGate::default();
        lock(&self.state).gate = Some(gate.clone());
        gate
    }

    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }

    fn route(&self, url: &str) -> Option<Route> {
        let mut state = lock(&self.state);
        state.requests.push(url.to_string());
        state.routes.get(url).cloned()
    }

    fn gate(&self) -> Option<DownloadGate> {
        lock(&self.state).gate.clone()
    }
}

fn not_found(url: &str) -> TransportError {
    status_error(url, 404)
}

fn status_error(url: &str, status: u16) -> TransportError {
    TransportError::HttpStatus {
        url: url.to_string(),
        status,
        body_snippet: String::new(),
    }
}

fn write_error(url: &str, source: std::io::Error) -> TransportError {
    TransportError::Write {
        url: url.to_string(),
        source,
    }
}

#[async_trait]
impl HttpTransport for StaticTransport {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        match self.route(url) {
            Some(Route::Body(body)) => Ok(String::from_utf8_lossy(&body).into_owned()),
            Some(Route::Status(status)) => Err(status_error(url, status)),
            Some(Route::FailAfter(_)) => Err(TransportError::request(url, "connection reset")),
            None => Err(not_found(url)),
        }
    }

    async fn download_to(
        &self,
        url: &str,
        dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError> {
        let route = self.route(url);

        if let Some(gate) = self.gate() {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        match route {
            Some(Route::Body(body)) => {
                dest.write_all(&body)
                    .await
                    .map_err(|source| write_error(url, source))?;
                dest.flush().await.map_err(|source| write_error(url, source))?;
                Ok(body.len() as u64)
            }
            Some(Route::FailAfter(partial)) => {
                dest.write_all(&partial)
                    .await
                    .map_err(|source| write_error(url, source))?;
                dest.flush().await.map_err(|source| write_error(url, source))?;
                Err(TransportError::request(url, "connection reset"))
            }
            Some(Route::Status(status)) => Err(status_error(url, status)),
            None => Err(not_found(url)),
        }
    }
}

/// Host adapter that records what the updater asked of it.
pub struct RecordingHost {
    platform: ServerPlatform,
    capabilities: HostCapabilities,
    version: String,
    installed: Mutex<Option<InstalledBuild>>,
    state: Mutex<ComponentState>,
    state_after_disable: ComponentState,
    broadcasts: Mutex<Vec<(String, Audience)>>,
    restarts: AtomicUsize,
    stops: AtomicUsize,
    disables: AtomicUsize,
    launch: LaunchCommand,
    configured_script: Mutex<Option<PathBuf>>,
    registered_script: Mutex<Option<PathBuf>>,
}

impl RecordingHost {
    #[must_use]
    pub fn new(platform: ServerPlatform, installed: InstalledBuild) -> Self {
        Self {
            platform,
            capabilities: HostCapabilities::for_platform(platform),
            version: "1.6.4".to_string(),
            installed: Mutex::new(Some(installed)),
            state: Mutex::new(ComponentState::Running),
            state_after_disable: ComponentState::Disabled,
            broadcasts: Mutex::new(Vec::new()),
            restarts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            disables: AtomicUsize::new(0),
            launch: LaunchCommand::new(
                "/usr/bin/java",
                ["-jar".to_string(), "server.jar".to_string()],
            ),
            configured_script: Mutex::new(None),
            registered_script: Mutex::new(None),
        }
    }

    /// State the component reports once disabling it returns. A host whose
    /// plugin manager ignores the request keeps reporting `Running`.
    #[must_use]
    pub fn with_state_after_disable(mut self, state: ComponentState) -> Self {
        self.state_after_disable = state;
        self
    }

    #[must_use]
    pub fn with_configured_script(self, script: impl Into<PathBuf>) -> Self {
        *lock(&self.configured_script) = Some(script.into());
        self
    }

    pub fn set_installed(&self, installed: Option<InstalledBuild>) {
        *lock(&self.installed) = installed;
    }

    #[must_use]
    pub fn broadcasts(&self) -> Vec<(String, Audience)> {
        lock(&self.broadcasts).clone()
    }

    #[must_use]
    pub fn restart_calls(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disable_calls(&self) -> usize {
        self.disables.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn registered_script(&self) -> Option<PathBuf> {
        lock(&self.registered_script).clone()
    }
}

#[async_trait]
impl HostAdapter for RecordingHost {
    fn platform(&self) -> ServerPlatform {
        self.platform
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    fn updater_version(&self) -> &str {
        &self.version
    }

    async fn installed_build(&self) -> Result<InstalledBuild, HostError> {
        lock(&self.installed)
            .clone()
            .ok_or_else(|| HostError::component_unavailable("Geyser is not loaded"))
    }

    fn component_state(&self) -> ComponentState {
        *lock(&self.state)
    }

    async fn disable_component(&self) -> Result<(), HostError> {
        self.disables.fetch_add(1, Ordering::SeqCst);
        *lock(&self.state) = self.state_after_disable;
        Ok(())
    }

    async fn broadcast(&self, message: &str, audience: Audience) {
        lock(&self.broadcasts).push((message.to_string(), audience));
    }

    async fn restart(&self) -> Result<(), HostError> {
        if !self.capabilities.native_restart {
            return Err(HostError::Unsupported {
                operation: "restart",
            });
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), HostError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn launch_command(&self) -> Result<LaunchCommand, HostError> {
        Ok(self.launch.clone())
    }

    fn configured_restart_script(&self) -> Option<PathBuf> {
        lock(&self.configured_script).clone()
    }

    fn register_restart_script(&self, script: &Path) -> Result<(), HostError> {
        *lock(&self.registered_script) = Some(script.to_path_buf());
        Ok(())
    }
}
