//! Release asset resolution across candidate GitHub repositories.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{ProvisionError, Result};
use super::fetcher::describe_error;
use super::types::{DependencySpec, ReleaseFallback};

/// Default GitHub REST API endpoint.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub release metadata from API
#[derive(Deserialize, Debug, Clone)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// GitHub release asset metadata
#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// Source of "latest release" metadata for a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self, repository: &str) -> Result<Release>;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
pub struct GithubReleases {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubReleases {
    pub fn new(user_agent: &str, api_base: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| ProvisionError::Client(describe_error(&e)))?;
        Ok(Self::from_client(client, api_base, token))
    }

    pub fn from_client(client: reqwest::Client, api_base: &str, token: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn latest_url(&self, repository: &str) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, repository)
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_release(&self, repository: &str) -> Result<Release> {
        let url = self.latest_url(repository);
        debug!("Querying {}", url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let network = |e: reqwest::Error| ProvisionError::Network {
            url: url.clone(),
            message: describe_error(&e),
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::HttpStatus {
                url: url.clone(),
                code: status.as_u16(),
                content_length: response.content_length(),
            });
        }

        response.json::<Release>().await.map_err(network)
    }
}

/// A release asset chosen for a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub repository: String,
    pub tag: String,
    pub asset_name: String,
    pub download_url: String,
    /// Inner archive path: the static one if configured, else inferred.
    pub inner_path: Option<String>,
}

/// Picks the first asset matching the fallback's pattern, trying each
/// candidate repository in order.
///
/// Fails with [`ProvisionError::ResolverExhausted`] only when every
/// candidate failed or had no match.
pub async fn resolve(
    source: &dyn ReleaseSource,
    fallback: &ReleaseFallback,
    spec: &DependencySpec,
) -> Result<ResolvedAsset> {
    let pattern = Regex::new(fallback.asset_pattern).map_err(|e| {
        ProvisionError::ResolverExhausted {
            failures: vec![format!("invalid asset pattern '{}': {}", fallback.asset_pattern, e)],
        }
    })?;

    let mut failures = Vec::new();

    for repository in fallback.repositories {
        let release = match source.latest_release(repository).await {
            Ok(release) => release,
            Err(e) => {
                warn!("Release lookup for {} failed: {}", repository, e);
                failures.push(format!("{}: {}", repository, e));
                continue;
            }
        };

        match release.assets.iter().find(|a| pattern.is_match(&a.name)) {
            Some(asset) => {
                info!(
                    "Resolved {} to {} ({}) from {}",
                    spec.id, asset.name, release.tag_name, repository
                );
                return Ok(ResolvedAsset {
                    repository: repository.to_string(),
                    tag: release.tag_name.clone(),
                    asset_name: asset.name.clone(),
                    download_url: asset.browser_download_url.clone(),
                    inner_path: spec.inner_path_for(&asset.name),
                });
            }
            None => {
                warn!(
                    "No asset matching {} in {} {}",
                    fallback.asset_pattern, repository, release.tag_name
                );
                failures.push(format!(
                    "{}: no asset matching {} in {}",
                    repository, fallback.asset_pattern, release.tag_name
                ));
            }
        }
    }

    Err(ProvisionError::ResolverExhausted { failures })
}
