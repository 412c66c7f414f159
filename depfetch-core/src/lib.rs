//! depfetch Core Library
//!
//! Provisions the external binaries a media pipeline shells out to:
//!
//! - Per-platform dependency tables for yt-dlp, deno and ffmpeg
//! - Downloads with redirects, idle timeouts and retries
//! - GitHub latest-release resolution with static URL fallback
//! - Checksum verification, archive extraction and binary validation
//! - Run configuration from defaults and the environment

pub mod config;
pub mod provision;

// Re-exports for convenience
pub use config::SetupConfig;
pub use provision::{
    DependencyId, InstallOutcome, InstallResult, Platform, ProvisionError, SetupOrchestrator,
    SetupReport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
