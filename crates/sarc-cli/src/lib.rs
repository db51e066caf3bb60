//! # sarc-cli — Command-Line Interface for Safe Keyed Archives
//!
//! Provides the `sarc` binary.
//!
//! ## Subcommands
//!
//! - `sarc inspect` - header probe, root reference and table summary.
//! - `sarc decode` - allow-listed decode, printed as JSON.
//! - `sarc encode` - archive a JSON document.
//! - `sarc digest` - SHA-1 of a text (NUL-terminated form).
//! - `sarc receipt` - verify a receipt payload for a bundle and device.
//!
//! ```bash
//! sarc inspect state.archive
//! sarc --config limits.yaml decode state.archive
//! sarc encode doc.json --output doc.archive
//! ```
//!
//! ## Exit Codes
//!
//! `0` on success, `1` on failure, `2` when the input was rejected by
//! policy (a disallowed type, an invalid receipt).
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs`; handlers here delegate to the
//!   library crates.

pub mod decode;
pub mod digest;
pub mod encode;
pub mod inspect;
pub mod receipt;

use std::path::Path;

use anyhow::{Context, Result};
use sarc_archive::ArchiveConfig;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REJECTED: u8 = 2;

/// Load the YAML config at `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ArchiveConfig> {
    match path {
        Some(path) => ArchiveConfig::from_path(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => Ok(ArchiveConfig::default()),
    }
}

/// Read a whole input file, naming it in the error.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_without_path() {
        let config = load_config(None).unwrap();
        assert_eq!(config, ArchiveConfig::default());
    }

    #[test]
    fn config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sarc.yaml");
        std::fs::write(&path, "limits:\n  max_depth: 16\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.limits.max_depth, 16);
    }

    #[test]
    fn missing_config_names_the_file() {
        let err = load_config(Some(Path::new("/nonexistent/sarc.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/sarc.yaml"));
    }
}
