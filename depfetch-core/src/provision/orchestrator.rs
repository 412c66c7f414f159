//! Runs the installer over every dependency of a platform profile.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog::{current_profile, PlatformProfile};
use super::error::Result;
use super::fetcher::{Fetcher, HttpFetcher};
use super::installer::BinaryInstaller;
use super::paths::ensure_output_dir;
use super::resolver::{GithubReleases, ReleaseSource};
use super::types::{Platform, SetupReport};
use crate::config::SetupConfig;

/// Provisions all dependencies for the host, one at a time.
pub struct SetupOrchestrator {
    config: SetupConfig,
    fetcher: Arc<dyn Fetcher>,
    releases: Arc<dyn ReleaseSource>,
}

impl SetupOrchestrator {
    /// Builds the HTTP-backed fetcher and release source from `config`.
    pub fn new(config: SetupConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.user_agent, config.download_timeout)?
            .with_token(config.github_token.clone());
        let releases = GithubReleases::new(
            &config.user_agent,
            &config.api_base,
            config.github_token.clone(),
        )?;
        Ok(Self::with_sources(config, Arc::new(fetcher), Arc::new(releases)))
    }

    /// Uses caller-provided network seams.
    pub fn with_sources(
        config: SetupConfig,
        fetcher: Arc<dyn Fetcher>,
        releases: Arc<dyn ReleaseSource>,
    ) -> Self {
        Self {
            config,
            fetcher,
            releases,
        }
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    /// Detects the host platform and provisions its profile.
    ///
    /// Fails only when the platform is unsupported or the output directory
    /// cannot be created; per-dependency failures land in the report.
    pub async fn run_setup(&self) -> Result<SetupReport> {
        let profile = current_profile().ok_or_else(Platform::unsupported_host)?;
        self.run_profile(profile).await
    }

    /// Provisions an explicit profile in its listed order.
    pub async fn run_profile(&self, profile: &PlatformProfile) -> Result<SetupReport> {
        let started_at = Utc::now();
        info!(
            "Provisioning {} dependencies into {}",
            profile.platform,
            self.config.output_dir.display()
        );
        ensure_output_dir(&self.config.output_dir).await?;

        let installer = BinaryInstaller::new(
            self.fetcher.as_ref(),
            self.releases.as_ref(),
            &self.config.output_dir,
            self.config.install_options(),
        );

        let mut results = Vec::new();
        for spec in profile.dependencies {
            if !self.config.includes(spec.id) {
                info!("Skipping {} (not selected)", spec.id);
                continue;
            }
            results.push(installer.install(spec).await);
        }

        let report = SetupReport {
            platform: profile.platform,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        let failed = report.failures().count();
        if failed == 0 {
            info!(
                "Setup finished: {} dependencies ready",
                report.results.len()
            );
        } else {
            warn!(
                "Setup finished with {} of {} dependencies failing",
                failed,
                report.results.len()
            );
        }
        Ok(report)
    }
}
