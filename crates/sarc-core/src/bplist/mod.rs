//! # Binary Property-List Codec
//!
//! Reader and writer for the `bplist00` container that carries keyed
//! archives.
//!
//! ## Layout
//!
//! ```text
//! "bplist00" | object area | offset table | 32-byte trailer
//! ```
//!
//! The trailer records the width of offset-table entries, the width of
//! object references, the object count, the top object and the offset of
//! the offset table. Every object starts with a marker byte whose high
//! nibble is the kind and whose low nibble is a size or length hint.
//!
//! ## Totality
//!
//! [`from_bytes`] returns for every input. All offsets and counts are
//! checked before they are used, container cycles are detected with an
//! explicit visit stack, and recursion depth, materialized node count and
//! copied payload bytes are bounded by [`ParseLimits`]. The payload budget
//! matters because a shared object is copied once per reference: a chain of
//! containers that each reference the next one twice doubles at every level.
//!
//! [`top_level_entries`] reads selected values of the top dictionary and
//! leaves the rest of the document unread.

mod reader;
mod writer;

pub use reader::{from_bytes, top_level_entries};
pub use writer::to_bytes;

/// Eight-byte header of a version-00 binary property list.
pub const BPLIST_MAGIC: &[u8; 8] = b"bplist00";

/// Size of the fixed trailer at the end of the document.
pub const TRAILER_LEN: usize = 32;

/// Resource bounds applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum container nesting depth.
    pub max_depth: usize,
    /// Maximum number of values materialized into the [`Plist`](crate::Plist)
    /// tree. Shared objects count once per occurrence, which bounds the
    /// expansion of documents that reference one container many times.
    pub max_nodes: usize,
    /// Maximum string and data payload bytes copied into the tree, counted
    /// once per occurrence like `max_nodes`.
    pub max_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_nodes: 4 * 1024 * 1024,
            max_bytes: 128 * 1024 * 1024,
        }
    }
}

/// Cheap sniff for property-list content: more than six bytes, starting
/// with `bplist`. Does not validate anything past the header.
pub fn looks_like_bplist(data: &[u8]) -> bool {
    data.len() > 6 && data.starts_with(b"bplist")
}
