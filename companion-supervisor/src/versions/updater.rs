//! Release availability checker.
//!
//! A release manifest names, per release, the image and tag of every service:
//!
//! ```json
//! { "1.1.0": { "dockers": { "core": { "image": "org/core", "tag": "1.1.0" } } } }
//! ```
//!
//! A release is available once every one of its tags exists in the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{VersionError, VersionSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseImage {
    pub image: String,
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub dockers: BTreeMap<String, ReleaseImage>,
}

/// Release name → images making up that release.
pub type ReleaseManifest = BTreeMap<String, Release>;

pub struct Updater {
    manifest_path: Option<PathBuf>,
    source: Arc<dyn VersionSource>,
}

impl Updater {
    pub fn new(manifest_path: Option<PathBuf>, source: Arc<dyn VersionSource>) -> Self {
        Self {
            manifest_path,
            source,
        }
    }

    pub async fn load_manifest(path: &Path) -> Result<ReleaseManifest, VersionError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| VersionError::Manifest(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| VersionError::Manifest(format!("{}: {e}", path.display())))
    }

    /// Availability of every release in `manifest`.
    pub async fn check(
        &self,
        manifest: &ReleaseManifest,
    ) -> Result<BTreeMap<String, bool>, VersionError> {
        let mut result = BTreeMap::new();

        for (release, contents) in manifest {
            let mut available = true;
            for (service, image) in &contents.dockers {
                if !self.source.is_available(&image.image, &image.tag).await? {
                    warn!(release = %release, service = %service, tag = %image.tag, "Tag missing from registry");
                    available = false;
                }
            }
            info!(release = %release, available, "Release checked");
            result.insert(release.clone(), available);
        }

        Ok(result)
    }

    /// Load the configured manifest and check it. No manifest, no releases.
    pub async fn check_releases(&self) -> Result<BTreeMap<String, bool>, VersionError> {
        let Some(path) = &self.manifest_path else {
            return Ok(BTreeMap::new());
        };
        let manifest = Self::load_manifest(path).await?;
        self.check(&manifest).await
    }
}
