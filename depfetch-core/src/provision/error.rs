//! Error taxonomy for provisioning.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while provisioning external binaries.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Network error while fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Timed out after {}s with no data from {url}", .after.as_secs())]
    Timeout { url: String, after: Duration },

    #[error("HTTP {code} from {url} (content-length: {})", content_length_display(.content_length))]
    HttpStatus {
        url: String,
        code: u16,
        content_length: Option<u64>,
    },

    #[error("Redirect error for {url}: {reason}")]
    Redirect { url: String, reason: String },

    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No candidate repository produced a matching asset: {}", .failures.join("; "))]
    ResolverExhausted { failures: Vec<String> },

    #[error("Failed to extract {}: {message}", .archive.display())]
    Extraction { archive: PathBuf, message: String },

    #[error("Binary not found in extracted archive at {}", .expected.display())]
    MissingBinary { expected: PathBuf },

    #[error("Validation of {} failed: {message}", .path.display())]
    Validation { path: PathBuf, message: String },

    #[error("Checksum unavailable for {asset}: {message}")]
    Checksum { asset: String, message: String },

    #[error("SHA256 mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn content_length_display(len: &Option<u64>) -> String {
    match len {
        Some(n) => n.to_string(),
        None => "unknown".to_string(),
    }
}

impl ProvisionError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the HTTP status code for `HttpStatus` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
