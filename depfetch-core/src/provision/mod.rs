//! Provisioning of external binaries (yt-dlp, deno, ffmpeg).
//!
//! Binaries are fetched from static URLs or the latest GitHub release,
//! verified, unpacked when needed, validated by running them, and only then
//! moved into the output directory.
//!
//! # Architecture
//!
//! - `types`: Core types (DependencyId, Platform, DependencySpec, reports)
//! - `catalog`: Static per-platform dependency tables
//! - `paths`: Output, download and scratch path layout
//! - `fetcher`: HTTP download with bounded redirects and an idle timeout
//! - `retry`: Bounded retries with linear backoff
//! - `resolver`: Latest-release asset lookup across candidate repositories
//! - `checksum`: SHA-256 manifest verification
//! - `extractor`: Archive extraction (zip, tar.xz, tar.gz)
//! - `validate`: Runs a binary to prove it works
//! - `installer`: Per-dependency install state machine
//! - `orchestrator`: Runs a whole platform profile
//!
//! # Example
//!
//! ```ignore
//! use depfetch_core::{SetupConfig, SetupOrchestrator};
//!
//! let orchestrator = SetupOrchestrator::new(SetupConfig::from_env())?;
//! let report = orchestrator.run_setup().await?;
//! for failure in report.failures() {
//!     eprintln!("{:?}", failure.outcome);
//! }
//! ```

pub mod catalog;
pub mod checksum;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod installer;
pub mod orchestrator;
pub mod paths;
pub mod resolver;
pub mod retry;
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use catalog::{all_profiles, current_profile, profile_for, PlatformProfile};
pub use error::{ProvisionError, Result};
pub use extractor::{extract_archive, Extractor};
pub use fetcher::{DownloadProgress, Fetcher, HttpFetcher};
pub use installer::{BinaryInstaller, InstallOptions};
pub use orchestrator::SetupOrchestrator;
pub use paths::default_output_dir;
pub use resolver::{resolve, GithubReleases, Release, ReleaseAsset, ReleaseSource, ResolvedAsset};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use types::{
    Arch, DependencyId, DependencySpec, ExtractMethod, InstallOutcome, InstallResult,
    InstallSource, Os, Platform, SetupReport,
};
pub use validate::validate_binary;
