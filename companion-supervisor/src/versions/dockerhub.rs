//! Docker Hub tag listing.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{VersionError, VersionSource};

const AUTH_URL: &str = "https://auth.docker.io";
const INDEX_URL: &str = "https://index.docker.io";
const CACHE_TTL: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Lists tags from Docker Hub using anonymous pull tokens.
pub struct DockerHubTags {
    client: reqwest::Client,
    auth_url: String,
    index_url: String,
    cache: Mutex<HashMap<String, (Instant, Vec<String>)>>,
}

impl Default for DockerHubTags {
    fn default() -> Self {
        Self::new(AUTH_URL, INDEX_URL)
    }
}

impl DockerHubTags {
    pub fn new(auth_url: impl Into<String>, index_url: impl Into<String>) -> Self {
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build registry client, using defaults without timeout");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            auth_url: auth_url.into(),
            index_url: index_url.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn token(&self, repository: &str) -> Result<String, VersionError> {
        let url = format!("{}/token", self.auth_url);
        let scope = format!("repository:{repository}:pull");
        let response = self
            .client
            .get(&url)
            .query(&[("service", "registry.docker.io"), ("scope", scope.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VersionError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(response.json::<TokenResponse>().await?.token)
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, VersionError> {
        let token = self.token(repository).await?;
        let url = format!("{}/v2/{}/tags/list", self.index_url, repository);
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            return Err(VersionError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        Ok(response
            .json::<TagsResponse>()
            .await?
            .tags
            .unwrap_or_default())
    }
}

/// Official images live under `library/` on the registry.
pub fn repository_name(image: &str) -> String {
    if image.contains('/') {
        image.to_string()
    } else {
        format!("library/{image}")
    }
}

#[async_trait]
impl VersionSource for DockerHubTags {
    async fn fetch_tags(&self, image: &str) -> Result<Vec<String>, VersionError> {
        let repository = repository_name(image);

        if let Some((fetched_at, tags)) = self.cache.lock().await.get(&repository)
            && fetched_at.elapsed() < CACHE_TTL
        {
            return Ok(tags.clone());
        }

        debug!(repository = %repository, "Fetching tags from registry");
        let tags = self.list_tags(&repository).await?;
        self.cache
            .lock()
            .await
            .insert(repository, (Instant::now(), tags.clone()));
        Ok(tags)
    }
}
