//! # SHA-1 Text Digest
//!
//! Hashes text the way stored lock-password hashes were produced: the UTF-8
//! bytes followed by a single NUL terminator. Digests of the same text are
//! therefore comparable with hashes computed from C strings.
//!
//! SHA-1 is used here for compatibility with existing stored values only.
//! Nothing in this crate relies on its collision resistance.

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// A 20-byte SHA-1 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Digest(pub [u8; 20]);

impl Sha1Digest {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 40-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() != 40 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Compare against a stored digest without early exit.
    pub fn matches(&self, stored: &[u8]) -> bool {
        self.0.as_slice().ct_eq(stored).into()
    }
}

impl std::fmt::Debug for Sha1Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha1Digest({})", self.to_hex())
    }
}

impl std::fmt::Display for Sha1Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// SHA-1 of `text` plus a trailing NUL byte.
pub fn sha1_digest(text: &str) -> Sha1Digest {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    from_output(&hasher.finalize())
}

/// SHA-1 of raw bytes.
pub fn sha1_bytes(data: &[u8]) -> Sha1Digest {
    from_output(&Sha1::digest(data))
}

fn from_output(hash: &[u8]) -> Sha1Digest {
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(hash);
    Sha1Digest(bytes)
}
