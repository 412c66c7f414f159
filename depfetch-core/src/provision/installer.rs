//! Per-dependency install state machine.
//!
//! `CHECK_EXISTING -> (SKIP | RESOLVE) -> DOWNLOAD -> VERIFY_CHECKSUM ->
//! (EXTRACT) -> LOCATE -> COPY -> SET_EXECUTABLE -> VALIDATE ->
//! (COMMIT | ROLLBACK)`
//!
//! The binary is staged inside the dependency's scratch directory and only
//! renamed onto the final path once it validates, so the final path is
//! never partially written. The download file and scratch directory are
//! removed on every terminal transition.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use super::checksum::verify_against_manifest;
use super::error::{ProvisionError, Result};
use super::extractor::{extract_archive, make_executable};
use super::fetcher::Fetcher;
use super::paths::{remove_file_if_exists, InstallPaths};
use super::resolver::{resolve, ReleaseSource};
use super::retry::{fetch_with_retry, RetryPolicy};
use super::types::{
    url_file_name, ChecksumManifest, DependencySpec, InstallOutcome, InstallResult, InstallSource,
};
use super::validate::{validate_binary, DEFAULT_VALIDATION_TIMEOUT};

/// Knobs for a single install.
#[derive(Debug, Clone, Copy)]
pub struct InstallOptions {
    pub retry: RetryPolicy,
    pub validation_timeout: Duration,
    /// Reinstall even if the final file exists and validates.
    pub force: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            force: false,
        }
    }
}

/// Where a dependency is downloaded from for this run.
#[derive(Debug, Clone)]
struct Target {
    url: String,
    asset_name: String,
    inner_path: Option<String>,
    repository: Option<String>,
}

/// Installs dependencies into one output directory.
pub struct BinaryInstaller<'a> {
    fetcher: &'a dyn Fetcher,
    releases: &'a dyn ReleaseSource,
    output_dir: PathBuf,
    options: InstallOptions,
}

impl<'a> BinaryInstaller<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        releases: &'a dyn ReleaseSource,
        output_dir: impl Into<PathBuf>,
        options: InstallOptions,
    ) -> Self {
        Self {
            fetcher,
            releases,
            output_dir: output_dir.into(),
            options,
        }
    }

    /// Ensures `spec` is present and runnable. Never panics or propagates;
    /// failures are reported in the returned result.
    pub async fn install(&self, spec: &DependencySpec) -> InstallResult {
        let paths = InstallPaths::new(&self.output_dir, spec);

        if !self.options.force && paths.final_path.exists() {
            // Leftovers from an interrupted run; never touches the final path.
            paths.cleanup().await;
            return self.check_existing(spec, &paths).await;
        }

        let mut attempted_url = None;
        let installed = self.install_fresh(spec, &paths, &mut attempted_url).await;
        let outcome = match installed {
            Ok((confirmation, source)) => {
                info!(
                    "{} installed at {} ({})",
                    spec.id,
                    paths.final_path.display(),
                    confirmation
                );
                InstallOutcome::Installed {
                    confirmation,
                    source,
                }
            }
            Err(e) => {
                let reason = match &attempted_url {
                    Some(url) => format!("failed to install {} from {}: {}", spec.id, url, e),
                    None => format!("failed to install {}: {}", spec.id, e),
                };
                error!("{}", reason);
                InstallOutcome::Failed { reason }
            }
        };

        paths.cleanup().await;

        InstallResult {
            dependency: spec.id,
            path: paths.final_path,
            url: attempted_url,
            outcome,
        }
    }

    /// Validates a pre-existing file without ever modifying it.
    async fn check_existing(&self, spec: &DependencySpec, paths: &InstallPaths) -> InstallResult {
        let confirmation = match validate_binary(
            &paths.final_path,
            &spec.validation,
            self.options.validation_timeout,
        )
        .await
        {
            Ok(line) => {
                info!("{} already present: {}", spec.id, line);
                Some(line)
            }
            Err(e) => {
                warn!(
                    "Existing {} at {} failed validation and was left untouched: {}",
                    spec.id,
                    paths.final_path.display(),
                    e
                );
                None
            }
        };

        InstallResult {
            dependency: spec.id,
            path: paths.final_path.clone(),
            url: None,
            outcome: InstallOutcome::AlreadyPresent { confirmation },
        }
    }

    async fn install_fresh(
        &self,
        spec: &DependencySpec,
        paths: &InstallPaths,
        attempted_url: &mut Option<String>,
    ) -> Result<(String, InstallSource)> {
        // Leftovers from an interrupted run.
        paths.cleanup().await;

        // RESOLVE
        let target = self.resolve_target(spec).await;
        *attempted_url = Some(target.url.clone());

        // DOWNLOAD
        fetch_with_retry(
            self.fetcher,
            &target.url,
            &paths.download,
            self.options.retry,
        )
        .await?;
        tokio::fs::create_dir_all(&paths.scratch)
            .await
            .map_err(|e| ProvisionError::io(&paths.scratch, e))?;

        // VERIFY_CHECKSUM
        if let Some(manifest) = spec.checksum {
            self.verify_checksum(&manifest, &target, paths).await?;
        }

        // EXTRACT + LOCATE
        let located = if spec.extract.requires_extraction() {
            extract_archive(&paths.download, &paths.unpacked, spec.extract).await?;
            let inner = target
                .inner_path
                .as_deref()
                .ok_or_else(|| ProvisionError::MissingBinary {
                    expected: paths.unpacked.clone(),
                })?;
            let candidate = paths.unpacked.join(inner);
            if !candidate.is_file() {
                return Err(ProvisionError::MissingBinary {
                    expected: candidate,
                });
            }
            candidate
        } else {
            paths.download.clone()
        };

        // COPY + SET_EXECUTABLE
        tokio::fs::copy(&located, &paths.staged)
            .await
            .map_err(|e| ProvisionError::io(&paths.staged, e))?;
        make_executable(&paths.staged)?;

        // VALIDATE
        let confirmation = match validate_binary(
            &paths.staged,
            &spec.validation,
            self.options.validation_timeout,
        )
        .await
        {
            Ok(line) => line,
            Err(e) => {
                warn!("Rolling back {}: {}", spec.id, e);
                remove_file_if_exists(&paths.staged).await;
                return Err(e);
            }
        };

        // COMMIT
        tokio::fs::rename(&paths.staged, &paths.final_path)
            .await
            .map_err(|e| ProvisionError::io(&paths.final_path, e))?;

        Ok((
            confirmation,
            InstallSource {
                url: target.url,
                repository: target.repository,
            },
        ))
    }

    /// Uses the resolver when configured, degrading to the static URL.
    async fn resolve_target(&self, spec: &DependencySpec) -> Target {
        if let Some(fallback) = &spec.release {
            match resolve(self.releases, fallback, spec).await {
                Ok(asset) => {
                    return Target {
                        url: asset.download_url,
                        asset_name: asset.asset_name,
                        inner_path: asset.inner_path,
                        repository: Some(asset.repository),
                    }
                }
                Err(e) => warn!(
                    "Release lookup for {} failed, using static URL {}: {}",
                    spec.id, spec.url, e
                ),
            }
        }

        let asset_name = url_file_name(spec.url)
            .unwrap_or(spec.file_name)
            .to_string();
        Target {
            url: spec.url.to_string(),
            inner_path: spec.inner_path_for(&asset_name),
            asset_name,
            repository: None,
        }
    }

    async fn verify_checksum(
        &self,
        manifest: &ChecksumManifest,
        target: &Target,
        paths: &InstallPaths,
    ) -> Result<()> {
        let checksum_error = |message: String| ProvisionError::Checksum {
            asset: target.asset_name.clone(),
            message,
        };

        let manifest_url = manifest
            .url_for(&target.url)
            .ok_or_else(|| {
                checksum_error(format!("cannot derive manifest URL from {}", target.url))
            })?;
        let manifest_path = paths.scratch.join(manifest.file_name);

        fetch_with_retry(
            self.fetcher,
            &manifest_url,
            &manifest_path,
            self.options.retry,
        )
        .await
        .map_err(|e| checksum_error(format!("failed to fetch {}: {}", manifest_url, e)))?;
        let text = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| ProvisionError::io(&manifest_path, e))?;

        let download = paths.download.clone();
        let asset_name = target.asset_name.clone();
        tokio::task::spawn_blocking(move || verify_against_manifest(&download, &text, &asset_name))
            .await
            .map_err(|e| checksum_error(format!("hashing task failed: {}", e)))??;

        info!("SHA256 verified for {}", target.asset_name);
        Ok(())
    }
}
