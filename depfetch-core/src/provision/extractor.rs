//! Archive extraction for downloaded assets.
//!
//! Each supported format is an [`Extractor`]; [`extractor_for`] maps an
//! [`ExtractMethod`] to one. Extraction is not safe against pre-existing
//! conflicting content, so callers hand in a fresh scratch directory.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path};
use tracing::{debug, info, warn};

use super::error::{ProvisionError, Result};
use super::types::ExtractMethod;

// ============================================================================
// Extractor Capability
// ============================================================================

/// Unpacks one archive format into a directory.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> io::Result<()>;

    /// Creates `dest_dir` and unpacks into it.
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        info!(
            "Extracting {} archive {} to {}",
            self.name(),
            archive_path.display(),
            dest_dir.display()
        );

        let wrap = |e: io::Error| ProvisionError::Extraction {
            archive: archive_path.to_path_buf(),
            message: e.to_string(),
        };

        fs::create_dir_all(dest_dir).map_err(wrap)?;
        self.unpack(archive_path, dest_dir).map_err(wrap)
    }
}

pub struct ZipExtractor;
pub struct TarXzExtractor;
pub struct TarGzExtractor;

/// Returns the extractor for a method, or `None` for direct binaries.
pub fn extractor_for(method: ExtractMethod) -> Option<&'static dyn Extractor> {
    match method {
        ExtractMethod::None => None,
        ExtractMethod::Zip => Some(&ZipExtractor),
        ExtractMethod::TarXz => Some(&TarXzExtractor),
        ExtractMethod::TarGz => Some(&TarGzExtractor),
    }
}

/// Extracts on a blocking thread so the async runtime stays responsive.
pub async fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    method: ExtractMethod,
) -> Result<()> {
    let Some(extractor) = extractor_for(method) else {
        return Ok(());
    };

    let archive = archive_path.to_path_buf();
    let dest = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extractor.extract(&archive, &dest))
        .await
        .map_err(|e| ProvisionError::Extraction {
            archive: archive_path.to_path_buf(),
            message: format!("extraction task failed: {}", e),
        })?
}

// ============================================================================
// ZIP Extraction
// ============================================================================

impl Extractor for ZipExtractor {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> io::Result<()> {
        let file = File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(invalid_data)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(invalid_data)?;
            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_owned(),
                None => {
                    debug!("Skipping unsafe path in zip");
                    continue;
                }
            };

            let dest_path = dest_dir.join(&entry_path);

            if entry.is_dir() {
                fs::create_dir_all(&dest_path)?;
            } else {
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut outfile = File::create(&dest_path)?;
                io::copy(&mut entry, &mut outfile)?;

                #[cfg(unix)]
                set_unix_permissions(&dest_path, entry.unix_mode())?;
            }
        }

        debug!("ZIP extraction complete");
        Ok(())
    }
}

fn invalid_data(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

// ============================================================================
// TAR Extraction
// ============================================================================

impl Extractor for TarXzExtractor {
    fn name(&self) -> &'static str {
        "tar.xz"
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> io::Result<()> {
        let reader = BufReader::new(File::open(archive_path)?);
        extract_tar(xz2::read::XzDecoder::new(reader), dest_dir)
    }
}

impl Extractor for TarGzExtractor {
    fn name(&self) -> &'static str {
        "tar.gz"
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> io::Result<()> {
        let reader = BufReader::new(File::open(archive_path)?);
        extract_tar(flate2::read::GzDecoder::new(reader), dest_dir)
    }
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    let dest_dir_canonical = dest_dir
        .canonicalize()
        .unwrap_or_else(|_| dest_dir.to_path_buf());

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();

        // Links could point outside dest_dir.
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping symlink/hardlink in tar archive");
            continue;
        }

        let path = entry.path()?.into_owned();
        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            warn!("Skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if !entry_type.is_file() {
            continue;
        }

        let parent = dest_path.parent().unwrap_or(dest_dir);
        fs::create_dir_all(parent)?;
        if !parent.canonicalize()?.starts_with(&dest_dir_canonical) {
            warn!("Skipping path that escapes dest_dir: {:?}", path);
            continue;
        }

        let mut outfile = File::create(&dest_path)?;
        io::copy(&mut entry, &mut outfile)?;
        outfile.flush()?;

        #[cfg(unix)]
        {
            if let Ok(mode) = entry.header().mode() {
                set_unix_permissions(&dest_path, Some(mode))?;
            }
        }
    }

    debug!("TAR extraction complete");
    Ok(())
}

// ============================================================================
// Unix Permissions
// ============================================================================

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        if mode & 0o111 != 0 {
            fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755))?;
        }
    }

    Ok(())
}

/// Adds `0o755` to a staged binary's mode. No-op on Windows.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| ProvisionError::io(path, e))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions).map_err(|e| ProvisionError::io(path, e))?;

        debug!("Marked {} executable", path.display());
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    fn append_entries<W: Write>(builder: &mut tar::Builder<W>, entries: &[(&str, &[u8], u32)]) {
        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
    }

    /// Writes a tar.xz containing the given `(path, contents, mode)` entries.
    pub(crate) fn write_tar_xz(archive_path: &Path, entries: &[(&str, &[u8], u32)]) {
        let encoder = xz2::write::XzEncoder::new(File::create(archive_path).unwrap(), 6);
        let mut builder = tar::Builder::new(encoder);
        append_entries(&mut builder, entries);
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_tar_gz(archive_path: &Path, entries: &[(&str, &[u8], u32)]) {
        let encoder = flate2::write::GzEncoder::new(
            File::create(archive_path).unwrap(),
            flate2::Compression::fast(),
        );
        let mut builder = tar::Builder::new(encoder);
        append_entries(&mut builder, entries);
        builder.into_inner().unwrap().finish().unwrap();
    }

    /// Writes a zip containing the given `(path, contents, mode)` entries.
    pub(crate) fn write_zip(archive_path: &Path, entries: &[(&str, &[u8], u32)]) {
        let mut zip = zip::ZipWriter::new(File::create(archive_path).unwrap());
        for (path, data, mode) in entries {
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
                .unix_permissions(*mode);
            zip.start_file(*path, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extractor_for_dispatch() {
        assert!(extractor_for(ExtractMethod::None).is_none());
        assert_eq!(extractor_for(ExtractMethod::Zip).unwrap().name(), "zip");
        assert_eq!(
            extractor_for(ExtractMethod::TarXz).unwrap().name(),
            "tar.xz"
        );
        assert_eq!(
            extractor_for(ExtractMethod::TarGz).unwrap().name(),
            "tar.gz"
        );
    }

    #[test]
    fn test_zip_keeps_layout_and_exec_bit() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("deno-x86_64-unknown-linux-gnu.zip");
        let out = temp.path().join("unpacked");
        write_zip(
            &archive,
            &[
                ("deno", b"#!/bin/sh\n", 0o755),
                ("LICENSE.md", b"MIT", 0o644),
            ],
        );

        ZipExtractor.extract(&archive, &out).unwrap();

        assert_eq!(fs::read(out.join("LICENSE.md")).unwrap(), b"MIT");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(out.join("deno")).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
            let mode = fs::metadata(out.join("LICENSE.md"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0);
        }
    }

    #[test]
    fn test_tar_xz_build_layout() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("ffmpeg-master-latest-linux64-gpl.tar.xz");
        let out = temp.path().join("unpacked");
        write_tar_xz(
            &archive,
            &[
                ("ffmpeg-master-latest-linux64-gpl/bin/ffmpeg", b"elf", 0o755),
                ("ffmpeg-master-latest-linux64-gpl/doc/readme", b"docs", 0o644),
            ],
        );

        TarXzExtractor.extract(&archive, &out).unwrap();

        let binary = out.join("ffmpeg-master-latest-linux64-gpl/bin/ffmpeg");
        assert_eq!(fs::read(binary).unwrap(), b"elf");
    }

    #[test]
    fn test_tar_gz_creates_missing_dest() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.tar.gz");
        let out = temp.path().join("a").join("b");
        write_tar_gz(&archive, &[("tool", b"payload", 0o644)]);

        TarGzExtractor.extract(&archive, &out).unwrap();
        assert_eq!(fs::read(out.join("tool")).unwrap(), b"payload");
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip").unwrap();

        let err = ZipExtractor
            .extract(&archive, &temp.path().join("out"))
            .unwrap_err();
        match err {
            ProvisionError::Extraction { archive: path, .. } => assert_eq!(path, archive),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_extract_archive_runs_off_runtime() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.tar.xz");
        let out = temp.path().join("unpacked");
        write_tar_xz(&archive, &[("bin/tool", b"x", 0o755)]);

        extract_archive(&archive, &out, ExtractMethod::TarXz)
            .await
            .unwrap();
        assert!(out.join("bin/tool").is_file());
    }

    #[tokio::test]
    async fn test_extract_archive_none_is_noop() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("never-created");
        extract_archive(&temp.path().join("missing"), &dest, ExtractMethod::None)
            .await
            .unwrap();
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_adds_exec_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let binary = temp.path().join("yt-dlp");
        fs::write(&binary, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o600)).unwrap();

        make_executable(&binary).unwrap();

        let mode = fs::metadata(&binary).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_tar_links_are_not_followed() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("hostile.tar.gz");
        let out = temp.path().join("unpacked");
        let outside = temp.path().join("outside.txt");

        {
            let encoder = flate2::write::GzEncoder::new(
                File::create(&archive).unwrap(),
                flate2::Compression::fast(),
            );
            let mut builder = tar::Builder::new(encoder);

            let mut link = tar::Header::new_gnu();
            link.set_entry_type(tar::EntryType::Symlink);
            link.set_size(0);
            link.set_mode(0o777);
            builder
                .append_link(&mut link, "bin/ffmpeg", "../../outside.txt")
                .unwrap();

            // A regular file written through the link would land outside.
            append_entries(&mut builder, &[("bin/ffmpeg", b"overwrite", 0o755)]);
            builder.into_inner().unwrap().finish().unwrap();
        }

        TarGzExtractor.extract(&archive, &out).unwrap();

        assert!(!outside.exists());
        assert_eq!(fs::read(out.join("bin/ffmpeg")).unwrap(), b"overwrite");
    }
}
