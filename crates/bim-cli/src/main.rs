//! bimcnv - scientific image inspector and converter

use anyhow::{Context, Result};
use bim_core::AllocLimits;
use bim_io::OpenOptions;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(name = "bimcnv")]
#[command(author, version, about = "Scientific image inspector and converter")]
#[command(long_about = "
Reads instrument image formats (Igor IBW, NanoScope, NRRD) and converts
them to NRRD.

Examples:
  bimcnv info scan.nan                  # Geometry and resolution
  bimcnv info wave.ibw --all            # Every metadata tag
  bimcnv formats                        # Registered formats
  bimcnv convert scan.nan scan.nrrd     # All pages to one NRRD volume
  bimcnv convert scan.nan height.nrrd -p 0 --endian big
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Upper bound for one decoded page, in MiB
    #[arg(long = "max-alloc-mb", global = true)]
    max_alloc_mb: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Display image information and metadata
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// List registered formats and their capabilities
    #[command(visible_alias = "f")]
    Formats(FormatsArgs),

    /// Convert an image to NRRD
    #[command(visible_alias = "c")]
    Convert(ConvertArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Input image(s)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Page to describe
    #[arg(short, long, default_value = "0")]
    page: u64,

    /// Show all metadata
    #[arg(short, long)]
    all: bool,

    /// Sample byte order for formats that do not record it: little, big
    #[arg(long)]
    endian: Option<String>,
}

#[derive(Args)]
struct FormatsArgs {
    /// Only list writable formats
    #[arg(short, long)]
    writable: bool,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input image
    input: PathBuf,

    /// Output image
    output: PathBuf,

    /// Convert only this page
    #[arg(short, long)]
    page: Option<u64>,

    /// Output format short name
    #[arg(short, long, default_value = "NRRD")]
    format: String,

    /// Output byte order: little, big
    #[arg(long)]
    endian: Option<String>,

    /// Input sample byte order for formats that do not record it
    #[arg(long = "input-endian")]
    input_endian: Option<String>,
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "bimcnv=debug,bim_io=debug,bim_core=debug"
    } else {
        "bimcnv=info,bim_io=info,bim_core=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_options(max_alloc_mb: Option<u64>) -> OpenOptions {
    let options = OpenOptions::new();
    match max_alloc_mb {
        Some(mb) => options.with_limits(AllocLimits::new(mb.saturating_mul(1024 * 1024))),
        None => options,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let options = open_options(cli.max_alloc_mb);
    match cli.command {
        Commands::Info(args) => commands::info::run(args, &options, cli.verbose),
        Commands::Formats(args) => commands::formats::run(args, cli.verbose),
        Commands::Convert(args) => commands::convert::run(args, &options, cli.verbose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bimcnv", "convert", "a.nan", "b.nrrd", "-j", "2", "--max-alloc-mb", "64",
        ])
        .unwrap();
        assert_eq!(cli.threads, 2);
        assert_eq!(cli.max_alloc_mb, Some(64));
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.format, "NRRD");
        assert_eq!(args.page, None);
    }

    #[test]
    fn alloc_limit_in_mib() {
        assert_eq!(open_options(Some(2)).limits.max_bytes, 2 * 1024 * 1024);
        assert_eq!(
            open_options(None).limits.max_bytes,
            AllocLimits::default().max_bytes
        );
    }
}
