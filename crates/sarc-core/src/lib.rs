//! # sarc-core — Foundational Types for Safe Keyed Archiving
//!
//! This crate is the leaf of the `sarc` workspace. It owns everything that
//! can be said about an archive without instantiating a single application
//! object:
//!
//! 1. **Binary property-list framing** ([`bplist`]). The wire container is a
//!    `bplist00` document. The reader is total over its input domain: every
//!    byte sequence yields either a [`Plist`] tree or a [`FramingError`].
//!
//! 2. **Keyed-archive layout** ([`frame`]). The `$archiver` / `$version` /
//!    `$top` / `$objects` dictionary is lifted into an [`ArchiveFrame`]: a flat
//!    object table of [`ArchiveValue`]s plus named root slots.
//!
//! 3. **`Uid` newtype.** Every reference into the object table is a [`Uid`],
//!    never a bare integer.
//!
//! 4. **One error taxonomy** ([`error`]). Corruption, policy violations,
//!    unsupported encoder input and resource limits are distinct variants so
//!    diagnostics can tell a malicious payload from transport damage.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `sarc-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod bplist;
pub mod error;
pub mod frame;
pub mod plist;
pub mod uid;

// Re-export primary types for ergonomic imports.
pub use bplist::{ParseLimits, BPLIST_MAGIC};
pub use error::{ArchiveError, ErrorKind, FieldError, FramingError};
pub use frame::{ArchiveFrame, ArchiveValue, ClassDescriptor, TypedObject};
pub use plist::Plist;
pub use uid::Uid;
