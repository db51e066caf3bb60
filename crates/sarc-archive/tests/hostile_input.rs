//! # Hostile Input Bounds
//!
//! Small documents engineered to expand, or to nest deeply, must end in a
//! `LimitExceeded` error under default limits. They must never exhaust
//! memory or overflow the stack of an ordinary 2 MiB thread.

use indexmap::IndexMap;
use sarc_archive::{
    archive, extract_root_uid, standard_registry, unarchive, ArchiveError, ArchiveLimits, Archiver,
    NsUrl, ObjectGraph, Uid,
};
use sarc_core::{ArchiveFrame, ArchiveValue, ClassDescriptor, TypedObject};

/// Stack size of a default spawned thread and of many async workers.
const SMALL_STACK: usize = 2 << 20;

fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(SMALL_STACK)
        .spawn(f)
        .expect("spawn test thread")
        .join()
        .expect("test thread panicked")
}

// ---------------------------------------------------------------------------
// Shared-object expansion
// ---------------------------------------------------------------------------

fn ascii(s: &str) -> Vec<u8> {
    let mut body = vec![0x50 | s.len() as u8];
    body.extend_from_slice(s.as_bytes());
    body
}

/// A keyed archive whose `$objects` is `["$null", payload[0]]`. Payload
/// object `i` sits at document index `12 + i` and may reference its
/// neighbours by that index.
fn keyed_document(payload: Vec<Vec<u8>>) -> Vec<u8> {
    let mut archiver = vec![0x5f, 0x10, 0x0f];
    archiver.extend_from_slice(b"NSKeyedArchiver");
    let mut version = vec![0x12];
    version.extend_from_slice(&100_000u32.to_be_bytes());

    let mut objects = vec![
        vec![0xd4, 1, 2, 3, 4, 5, 6, 7, 8],
        ascii("$archiver"),
        ascii("$version"),
        ascii("$top"),
        ascii("$objects"),
        archiver,
        version,
        vec![0xd1, 9, 10],
        vec![0xa2, 11, 12],
        ascii("root"),
        vec![0x80, 0x01],
        ascii("$null"),
    ];
    objects.extend(payload);
    assert!(objects.len() < 256, "single-byte references only");

    let mut out = b"bplist00".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for body in &objects {
        offsets.push(out.len() as u32);
        out.extend_from_slice(body);
    }
    let table = out.len() as u64;
    for offset in &offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 4, 1]);
    out.extend_from_slice(&(objects.len() as u64).to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&table.to_be_bytes());
    out
}

/// `levels` arrays that each reference the next one twice, then `leaf`.
fn doubling_payload(levels: u8, leaf: Vec<u8>) -> Vec<Vec<u8>> {
    let mut payload: Vec<Vec<u8>> = (0..levels)
        .map(|i| vec![0xa2, 13 + i, 13 + i])
        .collect();
    payload.push(leaf);
    payload
}

#[test]
fn doubling_chain_hits_byte_budget() {
    // 4096 copies of a 60 000-byte leaf would be about 245 MB.
    let mut leaf = vec![0x4f, 0x11];
    leaf.extend_from_slice(&60_000u16.to_be_bytes());
    leaf.extend(std::iter::repeat(0x5a).take(60_000));
    let bytes = keyed_document(doubling_payload(12, leaf));
    assert!(bytes.len() < 61_000);

    let err = unarchive(&bytes, standard_registry()).unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::LimitExceeded { limit: "max_plist_bytes", max }
            if max == ArchiveLimits::default().max_plist_bytes as u64
    ));
    assert_eq!(extract_root_uid(&bytes), Some(Uid::new(1)));
}

#[test]
fn extraction_skips_oversized_object_table() {
    // 2^23 integer leaves: far past the node budget if expanded.
    let bytes = keyed_document(doubling_payload(23, vec![0x10, 0x00]));

    let err = unarchive(&bytes, standard_registry()).unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::LimitExceeded { limit: "max_plist_nodes", .. }
    ));
    assert_eq!(extract_root_uid(&bytes), Some(Uid::new(1)));
}

// ---------------------------------------------------------------------------
// Reference depth
// ---------------------------------------------------------------------------

/// `len` URLs, each based on the previous one. The root is the last URL,
/// so the first one sits `len - 1` references deep and its own fields one
/// level further.
fn url_chain(len: usize) -> ObjectGraph {
    let mut graph = ObjectGraph::new();
    let mut previous = graph.insert(NsUrl::new("leaf/"));
    for i in 1..len {
        previous = graph.insert(NsUrl::with_base(previous, format!("p{i}/")));
    }
    graph.set_root(previous);
    graph
}

/// Object table of `len` URLs chained through `NS.base`, built directly so
/// no encoder recursion is involved.
fn url_chain_frame(len: u64) -> ArchiveFrame {
    let mut frame = ArchiveFrame::new();
    frame.objects.push(ArchiveValue::Class(ClassDescriptor::new("NSURL")));
    frame.objects.push(ArchiveValue::String("x/".into()));
    let first = frame.objects.len() as u64;
    for i in 0..len {
        let base = if i + 1 < len { Uid::new(first + i + 1) } else { Uid::NULL };
        let mut fields = IndexMap::new();
        fields.insert("NS.base".to_string(), ArchiveValue::Reference(base));
        fields.insert("NS.relative".to_string(), ArchiveValue::Reference(Uid::new(2)));
        frame.objects.push(ArchiveValue::Object(TypedObject {
            class: Uid::new(1),
            fields,
        }));
    }
    frame.top.insert("root".into(), Uid::new(first));
    frame
}

#[test]
fn default_depth_fits_small_stack() {
    let depth = ArchiveLimits::default().max_depth;
    let decoded_len = on_small_stack(move || {
        let graph = url_chain(depth);
        let bytes = archive(&graph).expect("chain at the depth limit encodes");
        unarchive(&bytes, standard_registry())
            .expect("chain at the depth limit decodes")
            .len()
    });
    assert_eq!(decoded_len, depth);
}

#[test]
fn one_past_default_depth_is_rejected() {
    let depth = ArchiveLimits::default().max_depth;
    let outcome = on_small_stack(move || {
        let graph = url_chain(depth + 1);
        let encode = archive(&graph).map(|_| ());

        let deep = ArchiveLimits {
            max_depth: depth + 8,
            ..ArchiveLimits::default()
        };
        let bytes = Archiver::with_limits(deep).archive(&graph).expect("raised limit encodes");
        let decode = unarchive(&bytes, standard_registry()).map(|g| g.len());
        (encode, decode)
    });
    assert!(matches!(outcome.0, Err(ArchiveError::LimitExceeded { limit: "max_depth", .. })));
    assert!(matches!(outcome.1, Err(ArchiveError::LimitExceeded { limit: "max_depth", .. })));
}

#[test]
fn long_chains_fail_cleanly_on_small_stack() {
    let (encode, decode) = on_small_stack(|| {
        let encode = archive(&url_chain(600)).map(|_| ());
        let bytes = url_chain_frame(600).to_bytes();
        let decode = unarchive(&bytes, standard_registry()).map(|g| g.len());
        (encode, decode)
    });
    assert!(matches!(encode, Err(ArchiveError::LimitExceeded { limit: "max_depth", .. })));
    assert!(matches!(decode, Err(ArchiveError::LimitExceeded { limit: "max_depth", .. })));
}
