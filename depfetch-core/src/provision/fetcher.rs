//! Streaming HTTP fetcher with bounded redirects and an idle timeout.
//!
//! Automatic redirects are disabled on the client so every hop passes
//! through [`HttpFetcher::fetch`], which caps the chain, validates each
//! target and decides per host whether to attach the GitHub token.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::error::{ProvisionError, Result};
use super::paths::remove_file_if_exists;

/// Maximum number of redirect hops followed for one fetch.
pub const MAX_REDIRECTS: usize = 5;

/// Default idle timeout for a transfer.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Redirect statuses that are followed.
const REDIRECT_CODES: &[u16] = &[301, 302, 303, 307, 308];

/// Hosts that receive the `Authorization` header when a token is set.
const TOKEN_HOSTS: &[&str] = &["github.com", "api.github.com"];

/// Progress is logged every time this many bytes arrive.
const PROGRESS_STEP: u64 = 4 * 1024 * 1024;

// ============================================================================
// Fetcher Capability
// ============================================================================

/// Streams a URL into a file.
///
/// On success exactly one file exists at `dest`; on any error no file is
/// left there.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

// ============================================================================
// Download Progress
// ============================================================================

/// Progress information during a download.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected (if known from Content-Length header).
    pub total_bytes: Option<u64>,
    /// Progress percentage (0.0 to 100.0), or None if total is unknown.
    pub percent: Option<f32>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f32 / total as f32) * 100.0
            } else {
                0.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }
}

// ============================================================================
// URL Validation
// ============================================================================

/// Parses a download URL; only http(s) with a host is accepted.
pub fn parse_download_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|e| ProvisionError::InvalidUrl {
        url: url_str.to_string(),
        reason: e.to_string(),
    })?;
    check_url(url)
}

fn check_url(url: Url) -> Result<Url> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProvisionError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ProvisionError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

/// Formats a reqwest error together with its source chain.
pub(crate) fn describe_error(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

enum Hop {
    Done(u64),
    Redirect(Url),
}

/// [`Fetcher`] backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    idle_timeout: Duration,
    token: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher with its own client.
    pub fn new(user_agent: &str, idle_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProvisionError::Client(describe_error(&e)))?;
        Ok(Self::from_client(client, idle_timeout))
    }

    /// Wraps an existing client. The client must not follow redirects itself.
    pub fn from_client(client: reqwest::Client, idle_timeout: Duration) -> Self {
        Self {
            client,
            idle_timeout,
            token: None,
        }
    }

    /// Sets the token sent to GitHub hosts.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn token_for(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        if TOKEN_HOSTS.contains(&host) {
            self.token.as_deref()
        } else {
            None
        }
    }

    async fn fetch_once(&self, url: &Url, dest: &Path) -> Result<Hop> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = self.token_for(url) {
            request = request.bearer_auth(token);
        }

        let response = match timeout(self.idle_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(network_error(url, &e)),
            Err(_) => return Err(self.timeout_error(url)),
        };

        let status = response.status();
        if REDIRECT_CODES.contains(&status.as_u16()) {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ProvisionError::Redirect {
                    url: url.to_string(),
                    reason: format!("HTTP {} without a Location header", status.as_u16()),
                })?;
            let next = url.join(location).map_err(|e| ProvisionError::Redirect {
                url: url.to_string(),
                reason: format!("invalid Location '{}': {}", location, e),
            })?;
            return Ok(Hop::Redirect(check_url(next)?));
        }

        if status != StatusCode::OK {
            return Err(ProvisionError::HttpStatus {
                url: url.to_string(),
                code: status.as_u16(),
                content_length: response.content_length(),
            });
        }

        let total_bytes = response.content_length();
        debug!("Content-Length: {:?}", total_bytes);

        let mut file = File::create(dest)
            .await
            .map_err(|e| ProvisionError::io(dest, e))?;

        let mut stream = response.bytes_stream();
        let mut bytes_downloaded: u64 = 0;
        let mut last_reported: u64 = 0;

        loop {
            let chunk = match timeout(self.idle_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(network_error(url, &e)),
                Ok(None) => break,
                Err(_) => return Err(self.timeout_error(url)),
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| ProvisionError::io(dest, e))?;
            bytes_downloaded += chunk.len() as u64;

            if bytes_downloaded - last_reported >= PROGRESS_STEP {
                let progress = DownloadProgress::new(bytes_downloaded, total_bytes);
                debug!(
                    bytes = progress.bytes_downloaded,
                    total = ?progress.total_bytes,
                    percent = ?progress.percent,
                    "Download progress"
                );
                last_reported = bytes_downloaded;
            }
        }

        file.flush().await.map_err(|e| ProvisionError::io(dest, e))?;

        if let Some(total) = total_bytes {
            if bytes_downloaded < total {
                return Err(ProvisionError::Network {
                    url: url.to_string(),
                    message: format!(
                        "connection closed after {} of {} bytes",
                        bytes_downloaded, total
                    ),
                });
            }
        }

        Ok(Hop::Done(bytes_downloaded))
    }

    fn timeout_error(&self, url: &Url) -> ProvisionError {
        ProvisionError::Timeout {
            url: url.to_string(),
            after: self.idle_timeout,
        }
    }
}

fn network_error(url: &Url, err: &reqwest::Error) -> ProvisionError {
    ProvisionError::Network {
        url: url.to_string(),
        message: describe_error(err),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProvisionError::io(parent, e))?;
        }

        let mut current = parse_download_url(url)?;
        for _ in 0..=MAX_REDIRECTS {
            match self.fetch_once(&current, dest).await {
                Ok(Hop::Done(bytes)) => {
                    info!(
                        "Download complete: {} bytes written to {}",
                        bytes,
                        dest.display()
                    );
                    return Ok(bytes);
                }
                Ok(Hop::Redirect(next)) => {
                    remove_file_if_exists(dest).await;
                    debug!("Redirected {} -> {}", current, next);
                    current = next;
                }
                Err(e) => {
                    remove_file_if_exists(dest).await;
                    return Err(e);
                }
            }
        }

        remove_file_if_exists(dest).await;
        Err(ProvisionError::Redirect {
            url: url.to_string(),
            reason: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }
}
