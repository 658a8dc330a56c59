//! Container runtime boundary.
//!
//! The supervisor never talks to a container engine directly. Everything goes
//! through [`ContainerRuntime`], keyed by an opaque [`ContainerRef`]:
//! - `DockerCli`: drives the `docker` binary (production)
//! - test doubles: scripted runtimes in the integration tests

pub mod docker;

pub use docker::DockerCli;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::ContainerOptions;

/// Opaque handle to a container, as handed out by the runtime on start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRef(String);

impl ContainerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last known state of a service's backing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObservedState {
    Stopped,
    Starting,
    Running,
    Failed,
}

/// Everything the runtime needs to (re)create a service's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, equal to the service name.
    pub name: String,
    pub image: String,
    pub tag: String,
    pub options: ContainerOptions,
}

impl ContainerSpec {
    /// `image:tag` reference passed to the runtime.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// Processes running inside a container, in `ps`-like tabular form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProcessList {
    /// Column headers (UID, PID, ..., CMD).
    pub titles: Vec<String>,
    /// One row per process, aligned with `titles`.
    pub processes: Vec<Vec<String>>,
}

/// Errors raised at the runtime boundary.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be executed at all.
    #[error("failed to execute `{command}`: {source}")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime ran but reported failure.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The call did not complete within its bound.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// The runtime answered with something we could not interpret.
    #[error("unexpected runtime output: {0}")]
    UnexpectedOutput(String),

    /// The runtime is unreachable or refused the request.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Capability set the supervisor needs from a container engine.
///
/// All calls may block on the engine; callers bound them with a timeout and
/// must not hold any service lock while awaiting them.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Current state of a container. A container that no longer exists is
    /// reported as [`ObservedState::Stopped`].
    async fn status(&self, container: &ContainerRef) -> Result<ObservedState, RuntimeError>;

    /// Create and start a container for `spec`, replacing any stale one.
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerRef, RuntimeError>;

    async fn stop(&self, container: &ContainerRef) -> Result<(), RuntimeError>;

    /// Restart in place. The payload is runtime-defined and passed through to
    /// callers unchanged.
    async fn restart(&self, container: &ContainerRef) -> Result<serde_json::Value, RuntimeError>;

    async fn top(&self, container: &ContainerRef) -> Result<ProcessList, RuntimeError>;

    async fn logs(&self, container: &ContainerRef) -> Result<String, RuntimeError>;
}
