//! Core types for dependency provisioning.
//!
//! This module defines the foundational types used across the provisioning
//! pipeline: dependency identifiers, platform detection, dependency specs,
//! and the per-run result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::ProvisionError;

// ============================================================================
// Dependency Identifiers
// ============================================================================

/// Unique identifier for each provisioned dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyId {
    /// yt-dlp - video extraction tool.
    YtDlp,
    /// Deno - scripting runtime used by yt-dlp for signature solving.
    Deno,
    /// FFmpeg - multimedia processing tool.
    Ffmpeg,
}

impl DependencyId {
    /// Returns all dependency IDs in installation order.
    pub fn all() -> &'static [DependencyId] {
        &[Self::YtDlp, Self::Deno, Self::Ffmpeg]
    }

    /// Returns the string identifier for this dependency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YtDlp => "yt-dlp",
            Self::Deno => "deno",
            Self::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DependencyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yt-dlp" | "ytdlp" | "yt_dlp" => Ok(Self::YtDlp),
            "deno" => Ok(Self::Deno),
            "ffmpeg" => Ok(Self::Ffmpeg),
            _ => Err(format!("Unknown dependency: {}", s)),
        }
    }
}

// ============================================================================
// Platform Detection
// ============================================================================

/// Operating system component of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

/// Processor architecture component of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// A supported (OS, architecture) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detects the current platform at compile time.
    ///
    /// Returns `None` if the platform is unsupported.
    pub fn detect() -> Option<Self> {
        let os = if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::Macos
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            return None;
        };

        let arch = if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            return None;
        };

        Some(Self { os, arch })
    }

    /// Builds the error reported when no profile exists for the running host.
    pub fn unsupported_host() -> ProvisionError {
        ProvisionError::UnsupportedPlatform {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    /// Returns a human-readable description of the platform.
    pub fn display_name(&self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Linux, Arch::X86_64) => "Linux (x86_64)",
            (Os::Linux, Arch::Aarch64) => "Linux (ARM64)",
            (Os::Macos, Arch::X86_64) => "macOS (Intel)",
            (Os::Macos, Arch::Aarch64) => "macOS (Apple Silicon)",
            (Os::Windows, Arch::X86_64) => "Windows (x86_64)",
            (Os::Windows, Arch::Aarch64) => "Windows (ARM64)",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Dependency Specs
// ============================================================================

/// How a downloaded asset is unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMethod {
    /// The asset is the binary itself.
    None,
    /// ZIP archive (.zip)
    Zip,
    /// XZ-compressed tar archive (.tar.xz)
    TarXz,
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
}

impl ExtractMethod {
    /// Returns true if the asset must be unpacked before use.
    pub fn requires_extraction(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Known archive extensions, longest first so `.tar.xz` wins over `.xz`.
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.xz", ".tar.gz", ".tgz", ".zip", ".7z"];

/// Strips a known archive extension from a file name.
///
/// `ffmpeg-master-latest-linux64-gpl.tar.xz` -> `ffmpeg-master-latest-linux64-gpl`
pub fn archive_stem(file_name: &str) -> &str {
    for ext in ARCHIVE_EXTENSIONS {
        let split = file_name.len().saturating_sub(ext.len());
        if let Some(suffix) = file_name.get(split..) {
            if split > 0 && suffix.eq_ignore_ascii_case(ext) {
                return &file_name[..split];
            }
        }
    }
    file_name
}

/// Returns the last path segment of a URL, without query or fragment.
pub fn url_file_name(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// The invocation used to prove a binary runs.
#[derive(Debug, Clone, Copy)]
pub struct Validation {
    /// Arguments passed to the binary; success is a zero exit code.
    pub args: &'static [&'static str],
}

/// Dynamic lookup of the latest asset across candidate repositories.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseFallback {
    /// Candidate repositories (`owner/name`), tried in order.
    pub repositories: &'static [&'static str],
    /// Regular expression matched against release asset file names.
    pub asset_pattern: &'static str,
}

/// A `sha256sum`-style manifest published next to the asset.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumManifest {
    /// File name of the manifest in the same release directory.
    pub file_name: &'static str,
}

impl ChecksumManifest {
    /// Returns the manifest URL living beside `download_url`.
    pub fn url_for(&self, download_url: &str) -> Option<String> {
        let without_query = download_url.split(['?', '#']).next()?;
        let (dir, _) = without_query.rsplit_once('/')?;
        Some(format!("{}/{}", dir, self.file_name))
    }
}

/// Immutable description of one external binary for one platform.
#[derive(Debug, Clone, Copy)]
pub struct DependencySpec {
    pub id: DependencyId,
    /// File name of the installed binary inside the output directory.
    pub file_name: &'static str,
    /// Static download URL, used when no resolver is configured or it fails.
    pub url: &'static str,
    /// Path of the binary inside the archive, when known up front.
    pub inner_path: Option<&'static str>,
    /// Template deriving the inner path from an archive name; `{stem}` is the
    /// archive file name without its extension.
    pub inner_path_template: Option<&'static str>,
    pub extract: ExtractMethod,
    pub validation: Validation,
    pub release: Option<ReleaseFallback>,
    pub checksum: Option<ChecksumManifest>,
}

impl DependencySpec {
    /// Computes the inner archive path for an asset with the given file name.
    ///
    /// A static inner path always wins over template inference.
    pub fn inner_path_for(&self, asset_name: &str) -> Option<String> {
        if let Some(path) = self.inner_path {
            return Some(path.to_string());
        }
        self.inner_path_template
            .map(|template| template.replace("{stem}", archive_stem(asset_name)))
    }

    /// Final install location inside `output_dir`.
    pub fn final_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.file_name)
    }
}

// ============================================================================
// Run Records
// ============================================================================

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success,
    Timeout,
    HttpError(u16),
    NetworkError,
    Failed(String),
}

impl DownloadOutcome {
    pub fn from_error(err: &ProvisionError) -> Self {
        match err {
            ProvisionError::Timeout { .. } => Self::Timeout,
            ProvisionError::HttpStatus { code, .. } => Self::HttpError(*code),
            ProvisionError::Network { .. } => Self::NetworkError,
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Transient record of one fetch; logged, never persisted.
#[derive(Debug, Clone)]
pub struct DownloadAttempt {
    pub url: String,
    pub destination: PathBuf,
    pub attempt: u32,
    pub bytes_received: u64,
    pub outcome: DownloadOutcome,
}

/// Where an installed binary came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSource {
    pub url: String,
    /// Repository the asset was resolved from, or `None` for the static URL.
    pub repository: Option<String>,
}

/// Per-dependency outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum InstallOutcome {
    /// The final file already existed. `confirmation` is `None` when the
    /// existing binary failed validation and was left untouched.
    AlreadyPresent { confirmation: Option<String> },
    Installed {
        confirmation: String,
        source: InstallSource,
    },
    Failed { reason: String },
}

/// Result of provisioning a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResult {
    pub dependency: DependencyId,
    pub path: PathBuf,
    /// The last URL attempted, if any network work happened.
    pub url: Option<String>,
    pub outcome: InstallOutcome,
}

impl InstallResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, InstallOutcome::Failed { .. })
    }

    /// A pre-existing binary that failed validation and was left in place.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.outcome,
            InstallOutcome::AlreadyPresent { confirmation: None }
        )
    }
}

/// Aggregated results of one setup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupReport {
    pub platform: Platform,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<InstallResult>,
}

impl SetupReport {
    /// True only if no dependency failed.
    pub fn is_success(&self) -> bool {
        !self.results.iter().any(InstallResult::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstallResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Entries counted as present whose binary does not currently run.
    pub fn degraded(&self) -> impl Iterator<Item = &InstallResult> {
        self.results.iter().filter(|r| r.is_degraded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE_SPEC: DependencySpec = DependencySpec {
        id: DependencyId::Ffmpeg,
        file_name: "ffmpeg",
        url: "https://example.com/ffmpeg-master-latest-linux64-gpl.tar.xz",
        inner_path: None,
        inner_path_template: Some("{stem}/bin/ffmpeg"),
        extract: ExtractMethod::TarXz,
        validation: Validation {
            args: &["-version"],
        },
        release: None,
        checksum: None,
    };

    #[test]
    fn test_dependency_id_round_trip() {
        for id in DependencyId::all() {
            assert_eq!(id.as_str().parse::<DependencyId>().unwrap(), *id);
        }
        assert_eq!(
            "YTDLP".parse::<DependencyId>().unwrap(),
            DependencyId::YtDlp
        );
        assert!("node".parse::<DependencyId>().is_err());
    }

    #[test]
    fn test_dependency_order() {
        assert_eq!(
            DependencyId::all(),
            &[DependencyId::YtDlp, DependencyId::Deno, DependencyId::Ffmpeg]
        );
    }

    #[test]
    fn test_platform_detect() {
        let platform = Platform::detect();
        #[cfg(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "windows", target_arch = "x86_64"),
            all(target_os = "windows", target_arch = "aarch64"),
        ))]
        assert!(platform.is_some());
        #[cfg(target_os = "windows")]
        assert!(platform.unwrap().is_windows());
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(
            archive_stem("ffmpeg-master-latest-linux64-gpl.tar.xz"),
            "ffmpeg-master-latest-linux64-gpl"
        );
        assert_eq!(
            archive_stem("deno-x86_64-apple-darwin.zip"),
            "deno-x86_64-apple-darwin"
        );
        assert_eq!(archive_stem("proj-v1.TGZ"), "proj-v1");
        assert_eq!(archive_stem("yt-dlp_linux"), "yt-dlp_linux");
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            url_file_name("https://github.com/a/b/releases/download/v1/tool.zip?x=1"),
            Some("tool.zip")
        );
        assert_eq!(url_file_name("https://example.com/"), None);
    }

    #[test]
    fn test_inner_path_inferred_from_template() {
        assert_eq!(
            TEMPLATE_SPEC.inner_path_for("ffmpeg-n7.1-latest-linux64-gpl-7.1.tar.xz"),
            Some("ffmpeg-n7.1-latest-linux64-gpl-7.1/bin/ffmpeg".to_string())
        );
    }

    #[test]
    fn test_static_inner_path_takes_precedence() {
        let spec = DependencySpec {
            inner_path: Some("deno"),
            ..TEMPLATE_SPEC
        };
        assert_eq!(
            spec.inner_path_for("anything.zip"),
            Some("deno".to_string())
        );
    }

    #[test]
    fn test_checksum_manifest_url() {
        let manifest = ChecksumManifest {
            file_name: "SHA2-256SUMS",
        };
        assert_eq!(
            manifest
                .url_for("https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_linux")
                .as_deref(),
            Some("https://github.com/yt-dlp/yt-dlp/releases/latest/download/SHA2-256SUMS")
        );
    }

    #[test]
    fn test_download_outcome_from_error() {
        let err = ProvisionError::HttpStatus {
            url: "u".into(),
            code: 503,
            content_length: None,
        };
        assert_eq!(
            DownloadOutcome::from_error(&err),
            DownloadOutcome::HttpError(503)
        );

        let err = ProvisionError::Network {
            url: "u".into(),
            message: "reset".into(),
        };
        assert_eq!(
            DownloadOutcome::from_error(&err),
            DownloadOutcome::NetworkError
        );
    }

    #[test]
    fn test_report_success_requires_no_failures() {
        let platform = Platform::new(Os::Linux, Arch::X86_64);
        let ok = InstallResult {
            dependency: DependencyId::YtDlp,
            path: PathBuf::from("yt-dlp"),
            url: None,
            outcome: InstallOutcome::AlreadyPresent {
                confirmation: Some("2025.01.01".into()),
            },
        };
        let failed = InstallResult {
            dependency: DependencyId::Ffmpeg,
            path: PathBuf::from("ffmpeg"),
            url: Some("https://example.com/ffmpeg.tar.xz".into()),
            outcome: InstallOutcome::Failed {
                reason: "boom".into(),
            },
        };

        let mut report = SetupReport {
            platform,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![ok.clone()],
        };
        assert!(report.is_success());

        report.results.push(failed);
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.degraded().count(), 0);
    }

    #[test]
    fn test_broken_existing_binary_is_degraded_not_failed() {
        let broken = InstallResult {
            dependency: DependencyId::Deno,
            path: PathBuf::from("deno"),
            url: None,
            outcome: InstallOutcome::AlreadyPresent { confirmation: None },
        };
        let report = SetupReport {
            platform: Platform::new(Os::Linux, Arch::X86_64),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![broken],
        };

        assert!(report.is_success());
        let degraded: Vec<_> = report.degraded().map(|r| r.dependency).collect();
        assert_eq!(degraded, vec![DependencyId::Deno]);
    }

    #[test]
    fn test_install_outcome_serializes_with_status_tag() {
        let outcome = InstallOutcome::Failed {
            reason: "boom".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
