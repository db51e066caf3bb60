//! Root reference extraction without decoding.
//!
//! Reads only the archive header and the `$top` table; the object table is
//! never parsed. No type is looked up or instantiated, so this is safe to
//! run on untrusted input before deciding whether to decode it at all.

use sarc_core::bplist::{looks_like_bplist, ParseLimits};
use sarc_core::frame::{peek_top_slot, ROOT_KEY};
use sarc_core::Uid;

/// The reference stored under `$top.root`, or `None` when `data` is not a
/// readable keyed archive or the slot is missing or not a reference.
pub fn extract_root_uid(data: &[u8]) -> Option<Uid> {
    extract_top_uid(data, ROOT_KEY)
}

/// The reference stored under `$top.<key>`.
pub fn extract_top_uid(data: &[u8], key: &str) -> Option<Uid> {
    match peek_top_slot(data, key, &ParseLimits::default()) {
        Ok(uid) => Some(uid),
        Err(err) => {
            tracing::trace!(key, error = %err, "top-level slot unavailable");
            None
        }
    }
}

/// Cheap header sniff; does not validate the document.
pub fn is_keyed_archive(data: &[u8]) -> bool {
    looks_like_bplist(data)
}
