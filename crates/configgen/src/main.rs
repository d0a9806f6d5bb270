//! Haystack Config Generator
//!
//! Generates agent configurations for one family from tagged building
//! metadata.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use configgen::{ConfigLoader, Family, RunOutcome};

/// Haystack Config Generator
#[derive(Parser, Debug)]
#[command(name = "haystack-configgen")]
#[command(about = "Generate agent configurations from Haystack tags", long_about = None)]
struct Args {
    /// Configuration family to generate
    #[arg(value_enum)]
    family: Family,

    /// Path to the configuration file (JSON with comments, or TOML)
    config: PathBuf,

    /// Output directory, overrides `output_dir`
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Site id, overrides `site_id`
    #[arg(long)]
    site_id: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("configgen=info,haystack_configgen=info"));
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    match run(&args) {
        Ok(RunOutcome::Success(report)) => {
            info!("Configs written to {}", report.output_dir.display());
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::PartialFailure(report)) => {
            warn!(
                "Configs written to {} with {} unmapped devices",
                report.output_dir.display(),
                report.unmapped
            );
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<RunOutcome> {
    info!("Starting haystack-configgen v{}", env!("CARGO_PKG_VERSION"));

    let mut loader = ConfigLoader::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(output_dir) = &args.output_dir {
        loader = loader.set("output_dir", output_dir);
    }
    if let Some(site_id) = &args.site_id {
        loader = loader.set("site_id", site_id);
    }
    let settings = loader.load().context("invalid configuration")?;

    let outcome = configgen::run(args.family, &settings)
        .with_context(|| format!("generating {} configs", args.family))?;
    Ok(outcome)
}
