//! # Encode Subcommand
//!
//! Archives a JSON document: objects become `NSDictionary`, arrays become
//! `NSArray`, scalars are stored as archive primitives.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sarc_archive::json::graph_from_json;
use sarc_archive::{ArchiveConfig, Archiver};

/// Arguments for the encode subcommand.
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON document to archive.
    pub input: PathBuf,

    /// Where to write the archive.
    #[arg(short, long)]
    pub output: PathBuf,
}

pub fn run_encode(args: &EncodeArgs, config: &ArchiveConfig) -> Result<u8> {
    let source = crate::read_input(&args.input)?;
    let bytes = encode_json(&source, config)
        .with_context(|| format!("failed to encode {}", args.input.display()))?;
    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("  wrote {} bytes to {}", bytes.len(), args.output.display());
    Ok(crate::EXIT_OK)
}

/// Parse JSON text and archive it under the configured limits.
pub fn encode_json(source: &[u8], config: &ArchiveConfig) -> Result<Vec<u8>> {
    let json: serde_json::Value = serde_json::from_slice(source).context("input is not valid JSON")?;
    let graph = graph_from_json(&json);
    let bytes = Archiver::with_limits(config.limits).archive(&graph)?;
    tracing::info!(objects = graph.len(), bytes = bytes.len(), "encoded JSON document");
    Ok(bytes)
}
