//! # sarc-crypto — Collaborators of the Archiving Core
//!
//! Small, pure helpers that sit next to keyed archiving but are not part
//! of it:
//!
//! - **SHA-1 text digest** ([`digest`]) over the NUL-terminated UTF-8 form of
//!   a string, for comparing against stored lock-password hashes.
//! - **Receipt verification** ([`receipt`]): bundle and device checks over
//!   the DER attribute set of an App Store receipt payload.
//! - **Environment probes** ([`environment`]): TestFlight detection from the
//!   receipt file name.
//!
//! ## Crate Policy
//!
//! - No dependency on other `sarc-*` crates.
//! - Hash comparisons go through `subtle` and never exit early.
//! - No `unsafe` code.

pub mod digest;
pub mod environment;
pub mod receipt;

pub use digest::{sha1_bytes, sha1_digest, Sha1Digest};
pub use environment::{is_running_in_testflight_environment, receipt_exists};
pub use receipt::{BundleReceiptVerifier, DeviceIdentity, ReceiptError, ReceiptVerifier};
