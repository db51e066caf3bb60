//! # Archive UIDs
//!
//! A [`Uid`] is an index into a keyed archive's `$objects` table. On the wire
//! it is the dedicated bplist UID object kind (marker `0x8n`), which is what
//! distinguishes a reference from an integer field value.

use serde::{Deserialize, Serialize};

/// Reference index into the object table of a keyed archive.
/// The default is the `$null` sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid(u64);

impl Uid {
    /// The `$null` sentinel always lives at index 0.
    pub const NULL: Uid = Uid(0);

    /// Wrap a raw table index.
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// The raw table index.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The index as a `usize`, if it fits on this platform.
    pub fn as_index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    /// True for the `$null` sentinel reference.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Uid {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UID({})", self.0)
    }
}
