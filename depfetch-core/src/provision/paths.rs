//! Path management for provisioned binaries.
//!
//! Final binaries live directly in the output directory. Each dependency
//! also owns two transient names next to it, both removed on every exit path:
//!
//! - `{file}.download.tmp` - the raw download
//! - `{file}-temp/` - the scratch directory (unpacked archive, staged binary)

use std::path::{Path, PathBuf};

use super::error::{ProvisionError, Result};
use super::types::DependencySpec;

/// Subdirectory name under the platform data directory.
const DEPFETCH_DIR: &str = "depfetch";

/// Returns the default output directory.
///
/// e.g. `~/.local/share/depfetch/bin` on Linux,
/// `~/Library/Application Support/depfetch/bin` on macOS,
/// `%LOCALAPPDATA%\depfetch\bin` on Windows. Falls back to the OS temp dir.
pub fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DEPFETCH_DIR)
        .join("bin")
}

/// Transient locations used while installing one dependency.
#[derive(Debug, Clone)]
pub struct InstallPaths {
    /// Where the binary ends up.
    pub final_path: PathBuf,
    /// Raw download target.
    pub download: PathBuf,
    /// Scratch directory for this dependency.
    pub scratch: PathBuf,
    /// Archive contents are unpacked here.
    pub unpacked: PathBuf,
    /// The copy that is validated before being renamed onto `final_path`.
    pub staged: PathBuf,
}

impl InstallPaths {
    pub fn new(output_dir: &Path, spec: &DependencySpec) -> Self {
        let scratch = output_dir.join(format!("{}-temp", spec.file_name));
        Self {
            final_path: spec.final_path(output_dir),
            download: output_dir.join(format!("{}.download.tmp", spec.file_name)),
            unpacked: scratch.join("unpacked"),
            staged: scratch.join(spec.file_name),
            scratch,
        }
    }

    /// Removes the download file and scratch directory, ignoring absence.
    pub async fn cleanup(&self) {
        remove_file_if_exists(&self.download).await;
        if let Err(e) = tokio::fs::remove_dir_all(&self.scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", self.scratch.display(), e);
            }
        }
    }
}

/// Deletes a file, treating "not found" as success.
pub async fn remove_file_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Ensures the output directory exists.
pub async fn ensure_output_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ProvisionError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::types::{DependencyId, ExtractMethod, Validation};
    use tempfile::TempDir;

    const SPEC: DependencySpec = DependencySpec {
        id: DependencyId::Deno,
        file_name: "deno",
        url: "https://example.com/deno.zip",
        inner_path: Some("deno"),
        inner_path_template: None,
        extract: ExtractMethod::Zip,
        validation: Validation {
            args: &["--version"],
        },
        release: None,
        checksum: None,
    };

    #[test]
    fn test_default_output_dir_contains_depfetch() {
        let dir = default_output_dir();
        assert!(dir.ends_with("bin"));
        assert!(dir.to_string_lossy().contains("depfetch"));
    }

    #[test]
    fn test_install_paths_are_dependency_scoped() {
        let out = Path::new("/out");
        let paths = InstallPaths::new(out, &SPEC);
        assert_eq!(paths.final_path, out.join("deno"));
        assert_eq!(paths.download, out.join("deno.download.tmp"));
        assert_eq!(paths.scratch, out.join("deno-temp"));
        assert!(paths.unpacked.starts_with(&paths.scratch));
        assert!(paths.staged.starts_with(&paths.scratch));
        assert!(paths.staged.ends_with("deno"));
        assert_ne!(paths.staged, paths.unpacked.join("deno"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_transient_files() {
        let temp = TempDir::new().unwrap();
        let paths = InstallPaths::new(temp.path(), &SPEC);

        tokio::fs::write(&paths.download, b"partial").await.unwrap();
        tokio::fs::create_dir_all(&paths.unpacked).await.unwrap();
        tokio::fs::write(paths.unpacked.join("x"), b"x")
            .await
            .unwrap();

        paths.cleanup().await;
        assert!(!paths.download.exists());
        assert!(!paths.scratch.exists());

        // Second cleanup is a no-op.
        paths.cleanup().await;
    }
}
