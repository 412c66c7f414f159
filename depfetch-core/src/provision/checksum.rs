//! SHA-256 verification against `sha256sum`-format manifests.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::error::{ProvisionError, Result};

/// Finds the hash listed for `asset_name` in a `sha256sum` manifest.
///
/// Accepts both `<hash>  <name>` and binary-mode `<hash> *<name>` lines.
pub fn parse_sha256_for_asset(manifest: &str, asset_name: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let (hash, name) = trimmed.split_once(char::is_whitespace)?;
        let name = name.trim().trim_start_matches('*').trim_start_matches("./");
        let valid = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit());
        (valid && name == asset_name).then(|| hash.to_ascii_lowercase())
    })
}

/// Computes the lowercase hex SHA-256 of a file.
pub fn sha256_of_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ProvisionError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| ProvisionError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Checks `path` against the manifest entry for `asset_name`.
pub fn verify_against_manifest(path: &Path, manifest: &str, asset_name: &str) -> Result<()> {
    let expected =
        parse_sha256_for_asset(manifest, asset_name).ok_or_else(|| ProvisionError::Checksum {
            asset: asset_name.to_string(),
            message: "no entry in checksum manifest".to_string(),
        })?;

    let actual = sha256_of_file(path)?;
    if actual != expected {
        return Err(ProvisionError::ChecksumMismatch {
            asset: asset_name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
