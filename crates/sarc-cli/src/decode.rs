//! # Decode Subcommand
//!
//! Decodes an archive against the configured allow-list and prints the
//! object graph as JSON. A disallowed type exits with code 2.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sarc_archive::json::graph_to_json;
use sarc_archive::{ArchiveConfig, ArchiveError, TypeRegistry, Unarchiver};

/// Arguments for the decode subcommand.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Archive file to decode.
    pub file: PathBuf,

    /// Print JSON on a single line.
    #[arg(long)]
    pub compact: bool,
}

pub fn run_decode(args: &DecodeArgs, config: &ArchiveConfig) -> Result<u8> {
    let bytes = crate::read_input(&args.file)?;
    let registry = config.registry().context("invalid allow-list in config")?;

    match decode_to_json(&bytes, &registry, config) {
        Ok(json) => {
            let rendered = if args.compact {
                serde_json::to_string(&json)?
            } else {
                serde_json::to_string_pretty(&json)?
            };
            println!("{rendered}");
            Ok(crate::EXIT_OK)
        }
        Err(err) if err.is_policy_violation() => {
            tracing::warn!(kind = %err.kind(), file = %args.file.display(), "decode rejected");
            eprintln!("rejected: {err}");
            Ok(crate::EXIT_REJECTED)
        }
        Err(err) => Err(err).with_context(|| format!("failed to decode {}", args.file.display())),
    }
}

/// Decode `bytes` and render the graph as JSON.
pub fn decode_to_json(
    bytes: &[u8],
    registry: &TypeRegistry,
    config: &ArchiveConfig,
) -> Result<serde_json::Value, ArchiveError> {
    let graph = Unarchiver::with_limits(registry, config.limits).unarchive(bytes)?;
    Ok(graph_to_json(&graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sarc_archive::{NsUrl, ObjectGraph};

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn decodes_to_json() {
        let graph = sarc_archive::json::graph_from_json(&serde_json::json!({"k": "v"}));
        let bytes = sarc_archive::archive(&graph).unwrap();
        let json = decode_to_json(&bytes, &TypeRegistry::standard(), &ArchiveConfig::default()).unwrap();
        assert_eq!(json["$class"], "NSDictionary");
        assert_eq!(json["NS.keys"][0], "k");
        assert_eq!(json["NS.objects"][0], "v");
    }

    #[test]
    fn policy_rejection_exits_two() {
        let mut graph = ObjectGraph::new();
        let url = graph.insert(NsUrl::new("https://example.com"));
        graph.set_root(url);
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "url.archive", &sarc_archive::archive(&graph).unwrap());

        let config = ArchiveConfig::from_yaml_str("allowed_types: [NSArray]\n").unwrap();
        let args = DecodeArgs {
            file: file.clone(),
            compact: true,
        };
        assert_eq!(run_decode(&args, &config).unwrap(), crate::EXIT_REJECTED);
        assert_eq!(run_decode(&args, &ArchiveConfig::default()).unwrap(), crate::EXIT_OK);
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "junk.archive", b"bplist00 junk");
        let args = DecodeArgs {
            file,
            compact: false,
        };
        let err = run_decode(&args, &ArchiveConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to decode"));
    }
}
