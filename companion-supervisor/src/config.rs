//! Service settings file.
//!
//! The settings file is the bootstrap source for the registry:
//!
//! ```json
//! { "dockers": { "core": { "image": "org/core", "tag": "1.0", "enabled": true } } }
//! ```
//!
//! After startup it is only ever written back (best effort), never re-read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Container creation options carried through to the runtime untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOptions {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// `host:container[:mode]` volume binds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    /// `host:container` port publications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// One managed service as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub image: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub options: ContainerOptions,
}

fn default_tag() -> String {
    "latest".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Full settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub dockers: BTreeMap<String, ServiceConfig>,
    /// Entries dropped by `--exclude`. Not managed, but written back as read.
    #[serde(skip)]
    pub excluded: BTreeMap<String, ServiceConfig>,
}

impl Settings {
    pub fn from_json(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load settings from disk, setting aside any service listed in `exclude`.
    pub fn load(path: &Path, exclude: &[String]) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_json(path, &contents)?;
        for name in exclude {
            if let Some(config) = settings.dockers.remove(name) {
                settings.excluded.insert(name.clone(), config);
            }
        }
        Ok(settings)
    }
}

/// Best-effort writer for the settings file.
///
/// Writes are serialized and atomic (temp file + rename). A store without a
/// path accepts every write and does nothing.
pub struct SettingsStore {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// A store that never touches the disk.
    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let encoded = serde_json::to_vec_pretty(settings)?;
        let _guard = self.write_lock.lock().await;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &encoded)
            .await
            .map_err(|source| ConfigError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), services = settings.dockers.len(), "Settings written");
        Ok(())
    }
}
