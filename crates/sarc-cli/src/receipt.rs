//! # Receipt Subcommand
//!
//! Verifies a receipt payload (the DER attribute set) for a bundle and a
//! device identifier given in hex. An invalid receipt exits with code 2.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use sarc_crypto::{is_running_in_testflight_environment, BundleReceiptVerifier, DeviceIdentity};

/// Arguments for the receipt subcommand.
#[derive(Args, Debug)]
pub struct ReceiptArgs {
    /// Receipt payload file.
    pub file: PathBuf,

    /// Expected bundle identifier.
    #[arg(long)]
    pub bundle_id: String,

    /// Device identifier as hex.
    #[arg(long)]
    pub device: String,

    /// Require an in-app purchase of this product.
    #[arg(long)]
    pub product: Option<String>,
}

pub fn run_receipt(args: &ReceiptArgs) -> Result<u8> {
    let payload = crate::read_input(&args.file)?;
    let device = DeviceIdentity::new(parse_hex(&args.device)?);
    let mut verifier = BundleReceiptVerifier::new(&args.bundle_id);
    if let Some(product) = &args.product {
        verifier = verifier.requiring_product(product);
    }

    let testflight = is_running_in_testflight_environment(Some(&args.file));
    println!("  testflight: {}", if testflight { "yes" } else { "no" });
    match verifier.check(&payload, &device) {
        Ok(()) => {
            println!("  receipt:    valid");
            Ok(crate::EXIT_OK)
        }
        Err(err) => {
            println!("  receipt:    invalid ({err})");
            Ok(crate::EXIT_REJECTED)
        }
    }
}

/// Decode a hex string, ignoring `:` separators.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| *b != b':').collect();
    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }
    digits
        .chunks(2)
        .map(|pair| -> Result<u8> {
            let pair = std::str::from_utf8(pair)?;
            Ok(u8::from_str_radix(pair, 16)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("00ff10").unwrap(), vec![0x00, 0xff, 0x10]);
        assert_eq!(parse_hex("aa:bb:cc").unwrap(), vec![0xaa, 0xbb, 0xcc]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn malformed_receipt_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sandboxReceipt");
        std::fs::write(&file, [0x31, 0x05, 0x00]).unwrap();
        let args = ReceiptArgs {
            file,
            bundle_id: "build.bru.Gladys".into(),
            device: "0102".into(),
            product: None,
        };
        assert_eq!(run_receipt(&args).unwrap(), crate::EXIT_REJECTED);
    }
}
