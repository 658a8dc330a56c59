//! Service registry and lifecycle operations.
//!
//! The [`Supervisor`] is built once at startup from the settings file and
//! shared (`Arc<Supervisor>`) between the reconcile loop and the HTTP layer.
//! Each service record sits behind its own lock; no lock is ever held while
//! the runtime, the registry client or a bridge process is awaited.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::config::{ServiceConfig, Settings, SettingsStore};
use crate::error::{Result, SupervisorError};
use crate::reconciler::MaintenanceTick;
use crate::runtime::{ContainerRef, ContainerRuntime, ProcessList, RuntimeError};
use crate::service::{Service, ServiceStatus};
use crate::session::{BridgeConfig, SessionManager};
use crate::versions::{DockerHubTags, Updater, VersionSource};

/// Default bound on every runtime call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Supervisor {
    services: BTreeMap<String, Arc<Mutex<Service>>>,
    /// Unmanaged entries carried through to the settings file.
    excluded: BTreeMap<String, ServiceConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    versions: Arc<dyn VersionSource>,
    release_manifest: Option<PathBuf>,
    sessions: SessionManager,
    store: SettingsStore,
    /// Held from snapshot to write, so saves land in snapshot order.
    persist_lock: Mutex<()>,
    call_timeout: Duration,
    ticks: watch::Sender<Option<MaintenanceTick>>,
}

impl Supervisor {
    pub fn new(settings: Settings, runtime: Arc<dyn ContainerRuntime>, store: SettingsStore) -> Self {
        let services = settings
            .dockers
            .into_iter()
            .map(|(name, config)| {
                let service = Service::new(name.clone(), config);
                (name, Arc::new(Mutex::new(service)))
            })
            .collect();
        let (ticks, _) = watch::channel(None);

        Self {
            services,
            excluded: settings.excluded,
            runtime,
            versions: Arc::new(DockerHubTags::default()),
            release_manifest: None,
            sessions: SessionManager::new(BridgeConfig::ttyd(
                "/usr/bin/ttyd",
                8082,
                "/usr/bin/docker",
            )),
            store,
            persist_lock: Mutex::new(()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            ticks,
        }
    }

    pub fn with_versions(mut self, versions: Arc<dyn VersionSource>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_release_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.release_manifest = Some(path.into());
        self
    }

    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.sessions = SessionManager::new(bridge);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = (&str, &Arc<Mutex<Service>>)> {
        self.services.iter().map(|(name, svc)| (name.as_str(), svc))
    }

    pub(crate) fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub(crate) fn ticks(&self) -> &watch::Sender<Option<MaintenanceTick>> {
        &self.ticks
    }

    fn record(&self, name: &str) -> Result<&Arc<Mutex<Service>>> {
        self.services
            .get(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    /// Container of `name`, or InvalidState if it was never started.
    async fn container(&self, name: &str) -> Result<ContainerRef> {
        self.record(name)?
            .lock()
            .await
            .container()
            .cloned()
            .ok_or_else(|| SupervisorError::InvalidState(format!("service {name} has no container")))
    }

    /// Run a runtime call under the configured timeout.
    pub(crate) async fn bounded<T>(
        &self,
        operation: String,
        call: impl Future<Output = std::result::Result<T, RuntimeError>>,
    ) -> std::result::Result<T, RuntimeError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::Timeout {
                operation,
                timeout: self.call_timeout,
            }),
        }
    }

    /// Current settings of every service, as they would be persisted.
    /// Excluded entries are included unchanged.
    pub async fn settings(&self) -> Settings {
        let mut settings = Settings {
            dockers: self.excluded.clone(),
            ..Settings::default()
        };
        for (name, svc) in &self.services {
            settings
                .dockers
                .insert(name.clone(), svc.lock().await.settings());
        }
        settings
    }

    /// Write settings back to disk. Failures are logged, never returned.
    pub(crate) async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let settings = self.settings().await;
        if let Err(e) = self.store.save(&settings).await {
            warn!(error = %e, "Failed to persist settings");
        }
    }

    pub async fn enable(&self, name: &str) -> Result<()> {
        let changed = self.record(name)?.lock().await.enable();
        if changed {
            info!(service = %name, "Service enabled");
            self.persist().await;
        }
        Ok(())
    }

    /// Takes effect on the next tick; the container is not stopped here.
    pub async fn disable(&self, name: &str) -> Result<()> {
        let changed = self.record(name)?.lock().await.disable();
        if changed {
            info!(service = %name, "Service disabled");
            self.persist().await;
        }
        Ok(())
    }

    /// Used by the next start; a running container keeps its version.
    pub async fn set_version(&self, name: &str, version: &str) -> Result<()> {
        self.record(name)?.lock().await.set_version(version);
        info!(service = %name, version = %version, "Service version set");
        self.persist().await;
        Ok(())
    }

    pub async fn restart(&self, name: &str) -> Result<serde_json::Value> {
        let container = self.container(name).await?;
        let payload = self
            .bounded(
                format!("restart {name}"),
                self.runtime.restart(&container),
            )
            .await?;
        info!(service = %name, container = %container, "Service restarted");
        Ok(payload)
    }

    pub async fn top(&self, name: &str) -> Result<ProcessList> {
        let container = self.container(name).await?;
        Ok(self
            .bounded(format!("top {name}"), self.runtime.top(&container))
            .await?)
    }

    pub async fn get_logs(&self, name: &str) -> Result<String> {
        let container = self.container(name).await?;
        Ok(self
            .bounded(format!("logs {name}"), self.runtime.logs(&container))
            .await?)
    }

    /// Status of every service. Reads recorded state only.
    pub async fn get_status(&self) -> BTreeMap<String, ServiceStatus> {
        let mut status = BTreeMap::new();
        for (name, svc) in &self.services {
            status.insert(name.clone(), svc.lock().await.status());
        }
        status
    }

    /// Open the terminal bridge into `name`'s container, replacing any
    /// active session. Returns the bridge pid.
    pub async fn attach(&self, name: &str) -> Result<u32> {
        let container = self.container(name).await?;
        self.sessions
            .attach(container)
            .await
            .map_err(|e| SupervisorError::Internal(format!("failed to start bridge: {e}")))
    }

    /// Tags published for `name`'s image.
    pub async fn available_versions(&self, name: &str) -> Result<Vec<String>> {
        let image = self.record(name)?.lock().await.image().to_string();
        Ok(self.versions.fetch_tags(&image).await?)
    }

    /// Availability of every release in the configured manifest.
    pub async fn check_releases(&self) -> Result<BTreeMap<String, bool>> {
        let updater = Updater::new(self.release_manifest.clone(), self.versions.clone());
        Ok(updater.check_releases().await?)
    }

    /// Most recent completed tick, if any.
    pub fn last_tick(&self) -> Option<MaintenanceTick> {
        self.ticks.borrow().clone()
    }

    pub fn subscribe_ticks(&self) -> watch::Receiver<Option<MaintenanceTick>> {
        self.ticks.subscribe()
    }

    /// Tear down process-scoped resources.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }
}
