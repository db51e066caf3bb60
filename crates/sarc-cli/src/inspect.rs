//! # Inspect Subcommand
//!
//! Reports what can be learned about an archive without instantiating any
//! object: whether it looks like a keyed archive, its root reference, the
//! size of its object table and the class names it declares.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sarc_archive::{extract_root_uid, is_keyed_archive, ArchiveConfig, Uid};
use sarc_core::{ArchiveFrame, ArchiveValue};

/// Arguments for the inspect subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Archive file to inspect.
    pub file: PathBuf,
}

/// Summary of an archive's framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectReport {
    pub keyed_archive: bool,
    pub root: Option<Uid>,
    pub entries: Option<usize>,
    pub classes: Vec<String>,
    pub error: Option<String>,
}

pub fn run_inspect(args: &InspectArgs, config: &ArchiveConfig) -> Result<u8> {
    let bytes = crate::read_input(&args.file)?;
    let report = inspect_bytes(&bytes, config);

    println!("  file:      {}", args.file.display());
    println!("  bplist:    {}", if report.keyed_archive { "yes" } else { "no" });
    match report.root {
        Some(uid) => println!("  root:      {uid}"),
        None => println!("  root:      not found"),
    }
    if let Some(entries) = report.entries {
        println!("  entries:   {entries}");
    }
    if !report.classes.is_empty() {
        println!("  classes:   {}", report.classes.join(", "));
    }
    match &report.error {
        Some(error) => {
            println!("  error:     {error}");
            Ok(crate::EXIT_FAILURE)
        }
        None => Ok(crate::EXIT_OK),
    }
}

pub fn inspect_bytes(bytes: &[u8], config: &ArchiveConfig) -> InspectReport {
    let mut report = InspectReport {
        keyed_archive: is_keyed_archive(bytes),
        root: extract_root_uid(bytes),
        entries: None,
        classes: Vec::new(),
        error: None,
    };
    match ArchiveFrame::from_bytes(bytes, &config.limits.parse_limits()) {
        Ok(frame) => {
            report.entries = Some(frame.objects.len());
            report.classes = frame
                .objects
                .iter()
                .filter_map(|entry| match entry {
                    ArchiveValue::Class(class) => Some(class.name.clone()),
                    _ => None,
                })
                .collect();
        }
        Err(err) => report.error = Some(err.to_string()),
    }
    report
}
