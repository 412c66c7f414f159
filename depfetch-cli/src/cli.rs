use clap::Parser;
use depfetch_core::{DependencyId, SetupConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Installs yt-dlp, deno and ffmpeg for this platform")]
pub struct Args {
    /// Directory receiving the binaries (default: platform data dir)
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only provision these dependencies (repeatable)
    #[arg(long = "only", value_name = "ID")]
    pub only: Vec<DependencyId>,

    /// Reinstall even if a working binary is already present
    #[arg(long)]
    pub force: bool,

    /// Abort a download after this many seconds without data
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Download attempts per file
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: Option<u32>,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Args {
    /// Flags win over environment values already in `config`.
    pub fn apply_to(&self, config: &mut SetupConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if !self.only.is_empty() {
            config.only = self.only.clone();
        }
        if self.force {
            config.force_reinstall = true;
        }
        if let Some(secs) = self.timeout {
            config.download_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = self.attempts {
            config.retry.max_attempts = attempts;
        }
    }
}
