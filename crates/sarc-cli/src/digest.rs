//! # Digest Subcommand
//!
//! Prints the SHA-1 of a text, hashed with its NUL terminator unless
//! `--raw` is given.

use anyhow::Result;
use clap::Args;
use sarc_crypto::{sha1_bytes, sha1_digest, Sha1Digest};

/// Arguments for the digest subcommand.
#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Text to hash.
    pub text: String,

    /// Hash the UTF-8 bytes only, without the trailing NUL.
    #[arg(long)]
    pub raw: bool,
}

pub fn run_digest(args: &DigestArgs) -> Result<u8> {
    println!("{}", digest_text(&args.text, args.raw));
    Ok(crate::EXIT_OK)
}

pub fn digest_text(text: &str, raw: bool) -> Sha1Digest {
    if raw {
        sha1_bytes(text.as_bytes())
    } else {
        sha1_digest(text)
    }
}
