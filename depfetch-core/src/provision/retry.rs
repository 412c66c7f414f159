//! Bounded retries with linear backoff around a [`Fetcher`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::error::Result;
use super::fetcher::Fetcher;
use super::paths::remove_file_if_exists;
use super::types::{DownloadAttempt, DownloadOutcome};

/// How many times a download is attempted and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `base_delay * n`.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay applied after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Fetches `url` into `dest`, retrying every failure kind uniformly.
///
/// Partial output is removed between attempts. The last error is returned
/// once `max_attempts` is exhausted.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &str,
    dest: &Path,
    policy: RetryPolicy,
) -> Result<u64> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = fetcher.fetch(url, dest).await;

        let record = DownloadAttempt {
            url: url.to_string(),
            destination: dest.to_path_buf(),
            attempt,
            bytes_received: *result.as_ref().unwrap_or(&0),
            outcome: match &result {
                Ok(_) => DownloadOutcome::Success,
                Err(e) => DownloadOutcome::from_error(e),
            },
        };

        match result {
            Ok(bytes) => {
                info!(
                    attempt = record.attempt,
                    bytes = record.bytes_received,
                    "Fetched {}",
                    record.url
                );
                return Ok(bytes);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    url, max_attempts, e
                );
                remove_file_if_exists(dest).await;
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    outcome = ?record.outcome,
                    "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    url,
                    e,
                    delay
                );
                remove_file_if_exists(&record.destination).await;
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
