//! Post-install validation by invoking the binary.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::error::{ProvisionError, Result};
use super::types::Validation;

/// Bound on how long a check invocation may run.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(8);

const TEXT_FILE_BUSY: i32 = 26;

/// Runs `path` with the validation arguments.
///
/// Success is exit code zero. Returns the first non-blank output line
/// (stdout first, then stderr) as a confirmation string.
pub async fn validate_binary(
    path: &Path,
    validation: &Validation,
    limit: Duration,
) -> Result<String> {
    let failed = |message: String| ProvisionError::Validation {
        path: path.to_path_buf(),
        message,
    };

    let mut command = Command::new(path);
    command
        .args(validation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut spawn_attempts = 0;
    let child = loop {
        match command.spawn() {
            Ok(child) => break child,
            // ETXTBSY: a just-written file can still be held open by a
            // concurrently forked process for a moment.
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) && spawn_attempts < 5 => {
                spawn_attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => return Err(failed(format!("failed to start: {}", e))),
        }
    };

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(failed(format!("failed to wait for process: {}", e))),
        Err(_) => return Err(failed(format!("timed out after {}s", limit.as_secs_f32()))),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first_line = first_non_blank_line(&stdout)
        .or_else(|| first_non_blank_line(&stderr))
        .unwrap_or_default()
        .to_string();

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let detail = if first_line.is_empty() {
            String::new()
        } else {
            format!(": {}", first_line)
        };
        return Err(failed(format!("exit status {}{}", code, detail)));
    }

    debug!("{} -> {}", path.display(), first_line);
    Ok(first_line)
}

fn first_non_blank_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_first_non_blank_line() {
        assert_eq!(
            first_non_blank_line("\n  \n yt-dlp 2025.01.01 \nmore"),
            Some("yt-dlp 2025.01.01")
        );
        assert_eq!(first_non_blank_line("   \n\t\n"), None);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_validation() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = validate_binary(
            &temp.path().join("does-not-exist"),
            &Validation {
                args: &["--version"],
            },
            DEFAULT_VALIDATION_TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation { .. }));
    }

    #[cfg(unix)]
    pub(crate) fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_returns_first_line() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("tool");
        write_script(&script, "echo\necho \"tool 1.2.3\"\necho extra");

        let validation = Validation {
            args: &["--version"],
        };
        let line = validate_binary(&script, &validation, DEFAULT_VALIDATION_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(line, "tool 1.2.3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_used_when_stdout_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("tool");
        write_script(&script, "echo \"ffmpeg version 7\" >&2");

        let validation = Validation {
            args: &["-version"],
        };
        let line = validate_binary(&script, &validation, DEFAULT_VALIDATION_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(line, "ffmpeg version 7");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("tool");
        write_script(&script, "echo broken\nexit 3");

        let validation = Validation { args: &[] };
        let err = validate_binary(&script, &validation, DEFAULT_VALIDATION_TIMEOUT)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit status 3"), "{msg}");
        assert!(msg.contains("broken"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_binary_times_out() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("tool");
        write_script(&script, "sleep 30");

        let validation = Validation { args: &[] };
        let err = validate_binary(&script, &validation, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passes_arguments() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("tool");
        write_script(&script, "[ \"$1\" = \"-version\" ] || exit 1\necho ok");

        let single_dash = Validation {
            args: &["-version"],
        };
        let double_dash = Validation {
            args: &["--version"],
        };
        assert!(validate_binary(&script, &single_dash, DEFAULT_VALIDATION_TIMEOUT)
            .await
            .is_ok());
        assert!(validate_binary(&script, &double_dash, DEFAULT_VALIDATION_TIMEOUT)
            .await
            .is_err());
    }
}
