//! Platform profile table with hardcoded dependency definitions.
//!
//! Each supported (OS, architecture) pair maps to the ordered list of
//! dependencies installed for it: yt-dlp, deno, ffmpeg. Static URLs are
//! the last-resort source; where upstream asset names drift, a
//! [`ReleaseFallback`] resolves the current asset first.

use super::types::{
    Arch, ChecksumManifest, DependencyId, DependencySpec, ExtractMethod, Os, Platform,
    ReleaseFallback, Validation,
};

/// Dependencies applicable to one platform.
#[derive(Debug)]
pub struct PlatformProfile {
    pub platform: Platform,
    pub dependencies: &'static [DependencySpec],
}

impl PlatformProfile {
    pub fn dependency(&self, id: DependencyId) -> Option<&'static DependencySpec> {
        self.dependencies.iter().find(|spec| spec.id == id)
    }
}

// ============================================================================
// Shared pieces
// ============================================================================

const YTDLP_REPOS: &[&str] = &["yt-dlp/yt-dlp", "yt-dlp/yt-dlp-nightly-builds"];
const DENO_REPOS: &[&str] = &["denoland/deno"];
const FFMPEG_REPOS: &[&str] = &["yt-dlp/FFmpeg-Builds", "BtbN/FFmpeg-Builds"];

const YTDLP_CHECKSUMS: Option<ChecksumManifest> = Some(ChecksumManifest {
    file_name: "SHA2-256SUMS",
});

const VERSION_CHECK: Validation = Validation {
    args: &["--version"],
};
const FFMPEG_CHECK: Validation = Validation {
    args: &["-version"],
};

const fn ytdlp(
    file_name: &'static str,
    url: &'static str,
    pattern: &'static str,
) -> DependencySpec {
    DependencySpec {
        id: DependencyId::YtDlp,
        file_name,
        url,
        inner_path: None,
        inner_path_template: None,
        extract: ExtractMethod::None,
        validation: VERSION_CHECK,
        release: Some(ReleaseFallback {
            repositories: YTDLP_REPOS,
            asset_pattern: pattern,
        }),
        checksum: YTDLP_CHECKSUMS,
    }
}

const fn deno(file_name: &'static str, url: &'static str, pattern: &'static str) -> DependencySpec {
    DependencySpec {
        id: DependencyId::Deno,
        file_name,
        url,
        inner_path: Some(file_name),
        inner_path_template: None,
        extract: ExtractMethod::Zip,
        validation: VERSION_CHECK,
        release: Some(ReleaseFallback {
            repositories: DENO_REPOS,
            asset_pattern: pattern,
        }),
        checksum: None,
    }
}

/// FFmpeg-Builds archives unpack to `<archive-stem>/bin/<binary>`.
const fn ffmpeg_build(
    file_name: &'static str,
    url: &'static str,
    template: &'static str,
    extract: ExtractMethod,
    pattern: &'static str,
) -> DependencySpec {
    DependencySpec {
        id: DependencyId::Ffmpeg,
        file_name,
        url,
        inner_path: None,
        inner_path_template: Some(template),
        extract,
        validation: FFMPEG_CHECK,
        release: Some(ReleaseFallback {
            repositories: FFMPEG_REPOS,
            asset_pattern: pattern,
        }),
        checksum: None,
    }
}

/// macOS builds are flat zips from a single host with stable URLs.
const fn ffmpeg_macos(url: &'static str) -> DependencySpec {
    DependencySpec {
        id: DependencyId::Ffmpeg,
        file_name: "ffmpeg",
        url,
        inner_path: Some("ffmpeg"),
        inner_path_template: None,
        extract: ExtractMethod::Zip,
        validation: FFMPEG_CHECK,
        release: None,
        checksum: None,
    }
}

// ============================================================================
// Linux
// ============================================================================

const LINUX_X64: &[DependencySpec] = &[
    ytdlp(
        "yt-dlp",
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_linux",
        r"^yt-dlp_linux$",
    ),
    deno(
        "deno",
        "https://github.com/denoland/deno/releases/latest/download/deno-x86_64-unknown-linux-gnu.zip",
        r"^deno-x86_64-unknown-linux-gnu\.zip$",
    ),
    ffmpeg_build(
        "ffmpeg",
        "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-linux64-gpl.tar.xz",
        "{stem}/bin/ffmpeg",
        ExtractMethod::TarXz,
        r"^ffmpeg-master-latest-linux64-gpl\.tar\.xz$",
    ),
];

const LINUX_ARM64: &[DependencySpec] = &[
    ytdlp(
        "yt-dlp",
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_linux_aarch64",
        r"^yt-dlp_linux_aarch64$",
    ),
    deno(
        "deno",
        "https://github.com/denoland/deno/releases/latest/download/deno-aarch64-unknown-linux-gnu.zip",
        r"^deno-aarch64-unknown-linux-gnu\.zip$",
    ),
    ffmpeg_build(
        "ffmpeg",
        "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-linuxarm64-gpl.tar.xz",
        "{stem}/bin/ffmpeg",
        ExtractMethod::TarXz,
        r"^ffmpeg-master-latest-linuxarm64-gpl\.tar\.xz$",
    ),
];

// ============================================================================
// macOS
// ============================================================================

const MACOS_X64: &[DependencySpec] = &[
    ytdlp(
        "yt-dlp",
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos",
        r"^yt-dlp_macos$",
    ),
    deno(
        "deno",
        "https://github.com/denoland/deno/releases/latest/download/deno-x86_64-apple-darwin.zip",
        r"^deno-x86_64-apple-darwin\.zip$",
    ),
    ffmpeg_macos("https://evermeet.cx/ffmpeg/getrelease/zip"),
];

const MACOS_ARM64: &[DependencySpec] = &[
    ytdlp(
        "yt-dlp",
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos",
        r"^yt-dlp_macos$",
    ),
    deno(
        "deno",
        "https://github.com/denoland/deno/releases/latest/download/deno-aarch64-apple-darwin.zip",
        r"^deno-aarch64-apple-darwin\.zip$",
    ),
    ffmpeg_macos("https://www.osxexperts.net/ffmpeg71arm.zip"),
];

// ============================================================================
// Windows
// ============================================================================

const WINDOWS_X64: &[DependencySpec] = &[
    ytdlp(
        "yt-dlp.exe",
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe",
        r"^yt-dlp\.exe$",
    ),
    deno(
        "deno.exe",
        "https://github.com/denoland/deno/releases/latest/download/deno-x86_64-pc-windows-msvc.zip",
        r"^deno-x86_64-pc-windows-msvc\.zip$",
    ),
    ffmpeg_build(
        "ffmpeg.exe",
        "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-win64-gpl.zip",
        "{stem}/bin/ffmpeg.exe",
        ExtractMethod::Zip,
        r"^ffmpeg-master-latest-win64-gpl\.zip$",
    ),
];

// deno ships no native Windows ARM64 build; the x64 one runs under emulation.
const WINDOWS_ARM64: &[DependencySpec] = &[
    ytdlp(
        "yt-dlp.exe",
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_arm64.exe",
        r"^yt-dlp_arm64\.exe$",
    ),
    deno(
        "deno.exe",
        "https://github.com/denoland/deno/releases/latest/download/deno-x86_64-pc-windows-msvc.zip",
        r"^deno-x86_64-pc-windows-msvc\.zip$",
    ),
    ffmpeg_build(
        "ffmpeg.exe",
        "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-winarm64-gpl.zip",
        "{stem}/bin/ffmpeg.exe",
        ExtractMethod::Zip,
        r"^ffmpeg-master-latest-winarm64-gpl\.zip$",
    ),
];

// ============================================================================
// Profile Table
// ============================================================================

static PROFILES: &[PlatformProfile] = &[
    PlatformProfile {
        platform: Platform::new(Os::Linux, Arch::X86_64),
        dependencies: LINUX_X64,
    },
    PlatformProfile {
        platform: Platform::new(Os::Linux, Arch::Aarch64),
        dependencies: LINUX_ARM64,
    },
    PlatformProfile {
        platform: Platform::new(Os::Macos, Arch::X86_64),
        dependencies: MACOS_X64,
    },
    PlatformProfile {
        platform: Platform::new(Os::Macos, Arch::Aarch64),
        dependencies: MACOS_ARM64,
    },
    PlatformProfile {
        platform: Platform::new(Os::Windows, Arch::X86_64),
        dependencies: WINDOWS_X64,
    },
    PlatformProfile {
        platform: Platform::new(Os::Windows, Arch::Aarch64),
        dependencies: WINDOWS_ARM64,
    },
];

/// Returns every known profile.
pub fn all_profiles() -> &'static [PlatformProfile] {
    PROFILES
}

/// Looks up the profile for a platform.
pub fn profile_for(platform: Platform) -> Option<&'static PlatformProfile> {
    PROFILES.iter().find(|p| p.platform == platform)
}

/// Returns the profile for the running host, if supported.
pub fn current_profile() -> Option<&'static PlatformProfile> {
    Platform::detect().and_then(profile_for)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_every_platform_has_all_dependencies_in_order() {
        assert_eq!(all_profiles().len(), 6);
        for profile in all_profiles() {
            let ids: Vec<_> = profile.dependencies.iter().map(|d| d.id).collect();
            assert_eq!(
                ids,
                DependencyId::all(),
                "Profile {} has wrong dependency order",
                profile.platform
            );
        }
    }

    #[test]
    fn test_windows_file_names_use_exe() {
        for profile in all_profiles() {
            for dep in profile.dependencies {
                assert_eq!(
                    dep.file_name.ends_with(".exe"),
                    profile.platform.is_windows(),
                    "{} on {}",
                    dep.id,
                    profile.platform
                );
            }
        }
    }

    #[test]
    fn test_archived_dependencies_have_an_inner_path() {
        for profile in all_profiles() {
            for dep in profile.dependencies {
                if dep.extract.requires_extraction() {
                    assert!(
                        dep.inner_path.is_some() || dep.inner_path_template.is_some(),
                        "{} on {} has no way to locate its binary",
                        dep.id,
                        profile.platform
                    );
                }
            }
        }
    }

    #[test]
    fn test_asset_patterns_compile_and_match_static_urls() {
        for profile in all_profiles() {
            for dep in profile.dependencies {
                let Some(release) = dep.release else { continue };
                let re = Regex::new(release.asset_pattern).unwrap();
                let name = crate::provision::types::url_file_name(dep.url).unwrap();
                assert!(
                    re.is_match(name),
                    "Pattern {} does not match static asset {}",
                    release.asset_pattern,
                    name
                );
            }
        }
    }

    #[test]
    fn test_ffmpeg_inner_path_from_static_url() {
        let profile = profile_for(Platform::new(Os::Linux, Arch::X86_64)).unwrap();
        let ffmpeg = profile.dependency(DependencyId::Ffmpeg).unwrap();
        assert_eq!(
            ffmpeg.inner_path_for("ffmpeg-master-latest-linux64-gpl.tar.xz"),
            Some("ffmpeg-master-latest-linux64-gpl/bin/ffmpeg".to_string())
        );
    }

    #[test]
    fn test_current_profile_matches_detection() {
        if let Some(platform) = Platform::detect() {
            assert_eq!(current_profile().unwrap().platform, platform);
        }
    }
}
