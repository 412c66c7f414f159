//! depfetch CLI
//!
//! Provisions yt-dlp, deno and ffmpeg for the current platform and exits
//! non-zero if anything could not be installed.

mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use depfetch_core::{InstallOutcome, SetupConfig, SetupOrchestrator, SetupReport};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use cli::Args;

fn main() -> ExitCode {
    let args = Args::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(args.verbose, rust_log.as_deref()))
        .init();

    tracing::info!("Starting depfetch v{}", depfetch_core::VERSION);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `--verbose` forces debug; otherwise `RUST_LOG` wins and info is the fallback.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::default().add_directive(tracing::Level::DEBUG.into());
    }
    match rust_log.map(str::trim).filter(|spec| !spec.is_empty()) {
        Some(spec) => EnvFilter::builder().parse_lossy(spec),
        None => EnvFilter::default().add_directive(tracing::Level::INFO.into()),
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = SetupConfig::from_env();
    args.apply_to(&mut config);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let orchestrator = SetupOrchestrator::new(config)?;
    let report = runtime.block_on(orchestrator.run_setup())?;

    if args.json {
        println!("{}", render_json(&report)?);
    } else {
        print_summary(&report);
    }

    for result in report.degraded() {
        tracing::warn!(
            "{} at {} failed validation and was left in place",
            result.dependency,
            result.path.display()
        );
    }

    let failed: Vec<_> = report
        .failures()
        .map(|r| r.dependency.to_string())
        .collect();
    if !failed.is_empty() {
        bail!("failed to provision: {}", failed.join(", "));
    }
    Ok(())
}

/// The report plus the dependencies kept despite failing validation.
fn render_json(report: &SetupReport) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(report)?;
    let degraded: Vec<_> = report.degraded().map(|r| r.dependency).collect();
    if let Some(fields) = value.as_object_mut() {
        fields.insert("degraded".to_string(), serde_json::to_value(degraded)?);
    }
    serde_json::to_string_pretty(&value)
}

fn print_summary(report: &SetupReport) {
    println!("Platform: {}", report.platform.display_name());
    for result in &report.results {
        let line = match &result.outcome {
            InstallOutcome::AlreadyPresent {
                confirmation: Some(version),
            } => format!("present    {}", version),
            InstallOutcome::AlreadyPresent { confirmation: None } => {
                "DEGRADED   failed validation, left in place".to_string()
            }
            InstallOutcome::Installed { confirmation, .. } => {
                format!("installed  {}", confirmation)
            }
            InstallOutcome::Failed { reason } => format!("FAILED     {}", reason),
        };
        println!("  {:<8} {}", result.dependency.as_str(), line);
        println!("           {}", result.path.display());
    }
}
