//! Run settings for a setup pass.
//!
//! Defaults are overlaid with environment variables; the CLI applies its
//! flags on top of that.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::provision::fetcher::DEFAULT_IDLE_TIMEOUT;
use crate::provision::installer::InstallOptions;
use crate::provision::paths::default_output_dir;
use crate::provision::resolver::GITHUB_API_BASE;
use crate::provision::retry::{duration_millis, RetryPolicy};
use crate::provision::types::DependencyId;
use crate::provision::validate::DEFAULT_VALIDATION_TIMEOUT;

// =============================================================================
// Environment Variables
// =============================================================================

/// Token variables, checked in order.
pub const TOKEN_ENV_VARS: &[&str] = &["DEPFETCH_GITHUB_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"];

/// Overrides the download idle timeout (whole seconds).
pub const TIMEOUT_ENV_VAR: &str = "DEPFETCH_DOWNLOAD_TIMEOUT_SECS";

/// Overrides the output directory.
pub const OUTPUT_DIR_ENV_VAR: &str = "DEPFETCH_OUTPUT_DIR";

/// User agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("depfetch/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Setup Configuration
// =============================================================================

/// Everything a setup run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Directory receiving the final binaries.
    pub output_dir: PathBuf,

    /// Abort a download when no bytes arrive for this long.
    #[serde(with = "duration_millis")]
    pub download_timeout: Duration,

    pub retry: RetryPolicy,

    /// Bound on each `--version` style check.
    #[serde(with = "duration_millis")]
    pub validation_timeout: Duration,

    /// Bearer token for GitHub requests. Never serialized.
    #[serde(skip)]
    pub github_token: Option<String>,

    /// GitHub REST API base URL.
    pub api_base: String,

    pub user_agent: String,

    /// Reinstall even when a valid binary is already present.
    #[serde(default)]
    pub force_reinstall: bool,

    /// Restrict the run to these dependencies. Empty means all.
    #[serde(default)]
    pub only: Vec<DependencyId>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            download_timeout: DEFAULT_IDLE_TIMEOUT,
            retry: RetryPolicy::default(),
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            github_token: None,
            api_base: GITHUB_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            force_reinstall: false,
            only: Vec::new(),
        }
    }
}

impl SetupConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Applies overrides from `lookup`. Blank or unparsable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = TOKEN_ENV_VARS.iter().find_map(|name| non_blank(name)) {
            self.github_token = Some(token.trim().to_string());
        }

        if let Some(raw) = non_blank(TIMEOUT_ENV_VAR) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.download_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "Ignoring invalid {}", TIMEOUT_ENV_VAR),
            }
        }

        if let Some(dir) = non_blank(OUTPUT_DIR_ENV_VAR) {
            self.output_dir = PathBuf::from(dir);
        }
    }

    /// Whether `id` is selected by the dependency filter.
    pub fn includes(&self, id: DependencyId) -> bool {
        self.only.is_empty() || self.only.contains(&id)
    }

    /// Per-install knobs derived from this config.
    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            retry: self.retry,
            validation_timeout: self.validation_timeout,
            force: self.force_reinstall,
        }
    }
}
