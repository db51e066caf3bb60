//! # sarc CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sarc_cli::decode::{run_decode, DecodeArgs};
use sarc_cli::digest::{run_digest, DigestArgs};
use sarc_cli::encode::{run_encode, EncodeArgs};
use sarc_cli::inspect::{run_inspect, InspectArgs};
use sarc_cli::receipt::{run_receipt, ReceiptArgs};

/// Safe keyed archive toolkit.
///
/// Inspects, decodes and encodes binary keyed archives. Decoding only
/// instantiates the types admitted by the allow-list.
#[derive(Parser, Debug)]
#[command(name = "sarc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML configuration file (limits and allowed types).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show header, root reference and declared classes without decoding.
    Inspect(InspectArgs),

    /// Decode an archive against the allow-list and print it as JSON.
    Decode(DecodeArgs),

    /// Archive a JSON document.
    Encode(EncodeArgs),

    /// SHA-1 digest of a text.
    Digest(DigestArgs),

    /// Verify a receipt payload for a bundle and device.
    Receipt(ReceiptArgs),
}

/// `RUST_LOG` when it is set and parses, otherwise the `-v` level.
fn log_filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| verbosity_filter(verbose))
}

fn verbosity_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = sarc_cli::load_config(cli.config.as_deref()).and_then(|config| match &cli.command {
        Commands::Inspect(args) => run_inspect(args, &config),
        Commands::Decode(args) => run_decode(args, &config),
        Commands::Encode(args) => run_encode(args, &config),
        Commands::Digest(args) => run_digest(args),
        Commands::Receipt(args) => run_receipt(args),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(sarc_cli::EXIT_FAILURE)
        }
    }
}
