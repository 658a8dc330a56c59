//! Error types surfaced by supervisor operations.

use thiserror::Error;

use crate::runtime::RuntimeError;
use crate::versions::VersionError;

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// No service with this name is registered.
    #[error("unknown service: {0}")]
    NotFound(String),

    /// Preconditions of the operation are not met.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The container runtime failed or timed out.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The image registry could not be queried.
    #[error("version lookup failed: {0}")]
    Version(#[from] VersionError),

    /// Unexpected internal failure.
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
