//! Shared test utilities for companion-supervisor integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use companion_supervisor::config::{ContainerOptions, ServiceConfig, Settings, SettingsStore};
use companion_supervisor::rest::{AppState, create_router};
use companion_supervisor::runtime::{
    ContainerRef, ContainerRuntime, ContainerSpec, ObservedState, ProcessList, RuntimeError,
};
use companion_supervisor::versions::{VersionError, VersionSource};
use companion_supervisor::{Supervisor, SupervisorError};
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Runtime call as seen by the fake, keyed by service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status(String),
    Start { name: String, image: String },
    Stop(String),
    Restart(String),
    Top(String),
    Logs(String),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    /// container id -> service name
    containers: HashMap<String, String>,
    /// state reported by `status`, per service
    states: HashMap<String, ObservedState>,
    failing_starts: HashSet<String>,
    failing_status: HashSet<String>,
    hanging: HashSet<String>,
    next_id: u32,
}

/// Scripted in-memory [`ContainerRuntime`].
///
/// Starts succeed and leave the container Running unless told otherwise.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_starts(&self, name: &str) {
        self.state.lock().unwrap().failing_starts.insert(name.to_string());
    }

    pub fn allow_starts(&self, name: &str) {
        self.state.lock().unwrap().failing_starts.remove(name);
    }

    pub fn fail_status(&self, name: &str) {
        self.state.lock().unwrap().failing_status.insert(name.to_string());
    }

    /// Every call for `name` blocks forever.
    pub fn hang(&self, name: &str) {
        self.state.lock().unwrap().hanging.insert(name.to_string());
    }

    pub fn set_state(&self, name: &str, observed: ObservedState) {
        self.state
            .lock()
            .unwrap()
            .states
            .insert(name.to_string(), observed);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn starts(&self, name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Start { name: n, .. } if n == name))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Record `call` for the service owning `container`; tell whether it hangs.
    fn record(&self, container: &ContainerRef, call: impl FnOnce(String) -> Call) -> (String, bool) {
        let mut state = self.state.lock().unwrap();
        let name = state
            .containers
            .get(container.as_str())
            .cloned()
            .unwrap_or_else(|| container.as_str().to_string());
        state.calls.push(call(name.clone()));
        let hangs = state.hanging.contains(&name);
        (name, hangs)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn status(&self, container: &ContainerRef) -> Result<ObservedState, RuntimeError> {
        let (name, hangs) = self.record(container, Call::Status);
        if hangs {
            std::future::pending::<()>().await;
        }

        let state = self.state.lock().unwrap();
        if state.failing_status.contains(&name) {
            return Err(RuntimeError::Unavailable(format!("status of {name}")));
        }
        Ok(state
            .states
            .get(&name)
            .copied()
            .unwrap_or(ObservedState::Stopped))
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerRef, RuntimeError> {
        let hangs = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Start {
                name: spec.name.clone(),
                image: spec.image_ref(),
            });
            state.hanging.contains(&spec.name)
        };
        if hangs {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.failing_starts.contains(&spec.name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker run {}", spec.name),
                status: "exit status: 125".to_string(),
                stderr: "image not found".to_string(),
            });
        }

        state.next_id += 1;
        let id = format!("{}-{}", spec.name, state.next_id);
        state.containers.insert(id.clone(), spec.name.clone());
        state.states.insert(spec.name.clone(), ObservedState::Running);
        Ok(ContainerRef::new(id))
    }

    async fn stop(&self, container: &ContainerRef) -> Result<(), RuntimeError> {
        let (name, _) = self.record(container, Call::Stop);
        self.state
            .lock()
            .unwrap()
            .states
            .insert(name, ObservedState::Stopped);
        Ok(())
    }

    async fn restart(&self, container: &ContainerRef) -> Result<serde_json::Value, RuntimeError> {
        let (_, hangs) = self.record(container, Call::Restart);
        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(serde_json::json!({ "container": container.as_str(), "restarted": true }))
    }

    async fn top(&self, container: &ContainerRef) -> Result<ProcessList, RuntimeError> {
        self.record(container, Call::Top);
        Ok(ProcessList {
            titles: vec!["PID".to_string(), "CMD".to_string()],
            processes: vec![vec!["42".to_string(), "sleep 5".to_string()]],
        })
    }

    async fn logs(&self, container: &ContainerRef) -> Result<String, RuntimeError> {
        let (name, _) = self.record(container, Call::Logs);
        Ok(format!("{name} says hello\n"))
    }
}

/// Fixed tag lists per image.
pub struct StaticTags(pub HashMap<String, Vec<String>>);

#[async_trait]
impl VersionSource for StaticTags {
    async fn fetch_tags(&self, image: &str) -> Result<Vec<String>, VersionError> {
        Ok(self.0.get(image).cloned().unwrap_or_default())
    }
}

pub fn service_config(image: &str, enabled: bool) -> ServiceConfig {
    ServiceConfig {
        image: image.to_string(),
        tag: "1.0".to_string(),
        enabled,
        options: ContainerOptions::default(),
    }
}

/// Settings with one `org/<name>:1.0` service per entry.
pub fn settings(services: &[(&str, bool)]) -> Settings {
    let mut settings = Settings::default();
    for (name, enabled) in services {
        settings.dockers.insert(
            name.to_string(),
            service_config(&format!("org/{name}"), *enabled),
        );
    }
    settings
}

pub fn supervisor(services: &[(&str, bool)], runtime: Arc<FakeRuntime>) -> Supervisor {
    Supervisor::new(settings(services), runtime, SettingsStore::disabled())
}

pub fn is_not_found(result: Result<impl std::fmt::Debug, SupervisorError>) -> bool {
    matches!(result, Err(SupervisorError::NotFound(_)))
}

/// Test server wrapper serving the REST API for a supervisor.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub supervisor: Arc<Supervisor>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn(supervisor: Supervisor) -> Self {
        let supervisor = Arc::new(supervisor);
        let router = create_router(Arc::new(AppState {
            supervisor: supervisor.clone(),
        }));

        // Port 0 lets the OS choose
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
        let actual_addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr: actual_addr,
            client: Client::new(),
            supervisor,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post(&self, path: &str) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn put_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .put(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.supervisor.shutdown().await;
    }
}
