//! Interactive terminal sessions.
//!
//! At most one bridge process (ttyd running `docker exec -it <container> tmux`
//! in production) exists at any time. Attaching again tears down the previous
//! bridge before the new one is spawned.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::runtime::ContainerRef;

/// How long a terminated bridge gets to exit before it is killed.
pub const SESSION_GRACE: Duration = Duration::from_millis(500);

/// Placeholder in bridge arguments replaced by the container reference.
pub const CONTAINER_PLACEHOLDER: &str = "{container}";

/// Command line of the bridge process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl BridgeConfig {
    /// ttyd on `port`, exec'ing into tmux inside the container.
    pub fn ttyd(ttyd: impl Into<PathBuf>, port: u16, docker: impl Into<PathBuf>) -> Self {
        let docker: PathBuf = docker.into();
        Self {
            program: ttyd.into(),
            args: vec![
                "-p".to_string(),
                port.to_string(),
                docker.display().to_string(),
                "exec".to_string(),
                "-it".to_string(),
                CONTAINER_PLACEHOLDER.to_string(),
                "/usr/bin/tmux".to_string(),
            ],
        }
    }

    fn args_for(&self, container: &ContainerRef) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(CONTAINER_PLACEHOLDER, container.as_str()))
            .collect()
    }
}

/// The active bridge.
#[derive(Debug)]
pub struct Session {
    container: ContainerRef,
    pid: u32,
    child: Child,
}

impl Session {
    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// SIGTERM, wait out the grace period, then SIGKILL.
    async fn terminate(mut self) {
        let pid = self.pid;
        if let Err(e) = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        ) {
            debug!(pid, error = %e, "SIGTERM to bridge failed");
        }

        match tokio::time::timeout(SESSION_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, %status, "Bridge exited");
            }
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Failed waiting for bridge");
            }
            Err(_) => {
                warn!(pid, "Bridge ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(pid, error = %e, "Failed to kill bridge");
                }
            }
        }

        info!(container = %self.container, pid, "Session terminated");
    }
}

/// Owner of the single session slot.
pub struct SessionManager {
    bridge: BridgeConfig,
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(bridge: BridgeConfig) -> Self {
        Self {
            bridge,
            current: Mutex::new(None),
        }
    }

    /// Replace any active session with a bridge into `container`.
    ///
    /// The slot stays locked from teardown to spawn, so two sessions never
    /// coexist.
    pub async fn attach(&self, container: ContainerRef) -> std::io::Result<u32> {
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            previous.terminate().await;
        }

        let child = Command::new(&self.bridge.program)
            .args(self.bridge.args_for(&container))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let Some(pid) = child.id() else {
            return Err(std::io::Error::other("bridge exited before it could be tracked"));
        };

        info!(container = %container, pid, program = %self.bridge.program.display(), "Session started");
        *current = Some(Session {
            container,
            pid,
            child,
        });

        Ok(pid)
    }

    /// Pid of the active bridge, if any.
    pub async fn active_pid(&self) -> Option<u32> {
        self.current.lock().await.as_ref().map(Session::pid)
    }

    pub async fn active_container(&self) -> Option<ContainerRef> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|s| s.container().clone())
    }

    /// Terminate the active session, if any.
    pub async fn shutdown(&self) {
        if let Some(session) = self.current.lock().await.take() {
            session.terminate().await;
        }
    }
}
