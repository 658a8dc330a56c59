//! Image version discovery.

pub mod dockerhub;
pub mod updater;

pub use dockerhub::DockerHubTags;
pub use updater::{ReleaseManifest, Updater};

use async_trait::async_trait;
use thiserror::Error;

/// Errors talking to an image registry.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("registry returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("failed to read release manifest: {0}")]
    Manifest(String),
}

/// Source of available image tags.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn fetch_tags(&self, image: &str) -> Result<Vec<String>, VersionError>;

    async fn is_available(&self, image: &str, tag: &str) -> Result<bool, VersionError> {
        Ok(self.fetch_tags(image).await?.iter().any(|t| t == tag))
    }
}
