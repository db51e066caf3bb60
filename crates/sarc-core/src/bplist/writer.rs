use std::collections::HashMap;

use super::{BPLIST_MAGIC, TRAILER_LEN};
use crate::plist::Plist;

/// Serialize a [`Plist`] tree as a `bplist00` document.
///
/// Equal strings are written once and shared by reference, which keeps the
/// repeated `$class` / `NS.objects` keys of keyed archives compact. All other
/// values are written once per occurrence.
pub fn to_bytes(value: &Plist) -> Vec<u8> {
    let mut flat = Flattener::default();
    let top = flat.push(value);
    let num_objects = flat.objects.len() as u64;
    let ref_size = width_for(num_objects.saturating_sub(1));

    let mut out = BPLIST_MAGIC.to_vec();
    let mut offsets = Vec::with_capacity(flat.objects.len());
    for object in &flat.objects {
        offsets.push(out.len() as u64);
        write_object(&mut out, object, ref_size);
    }

    let offset_table = out.len() as u64;
    let offset_size = width_for(offsets.last().copied().unwrap_or(0));
    for offset in &offsets {
        write_uint(&mut out, *offset, offset_size);
    }

    let mut trailer = [0u8; TRAILER_LEN];
    trailer[6] = offset_size as u8;
    trailer[7] = ref_size as u8;
    trailer[8..16].copy_from_slice(&num_objects.to_be_bytes());
    trailer[16..24].copy_from_slice(&top.to_be_bytes());
    trailer[24..32].copy_from_slice(&offset_table.to_be_bytes());
    out.extend_from_slice(&trailer);
    out
}

/// One entry of the flattened object list. Containers hold indices of their
/// children instead of the children themselves.
enum Flat<'a> {
    Leaf(&'a Plist),
    Key(&'a str),
    Array(Vec<u64>),
    Dictionary(Vec<u64>, Vec<u64>),
}

#[derive(Default)]
struct Flattener<'a> {
    objects: Vec<Flat<'a>>,
    strings: HashMap<&'a str, u64>,
}

impl<'a> Flattener<'a> {
    fn push(&mut self, value: &'a Plist) -> u64 {
        match value {
            Plist::String(s) => {
                if let Some(&index) = self.strings.get(s.as_str()) {
                    return index;
                }
                let index = self.reserve(Flat::Leaf(value));
                self.strings.insert(s.as_str(), index);
                index
            }
            Plist::Array(items) => {
                let index = self.reserve(Flat::Array(Vec::new()));
                let refs = items.iter().map(|item| self.push(item)).collect();
                self.objects[index as usize] = Flat::Array(refs);
                index
            }
            Plist::Dictionary(map) => {
                let index = self.reserve(Flat::Dictionary(Vec::new(), Vec::new()));
                let keys = map.keys().map(|k| self.push_key(k)).collect();
                let values = map.values().map(|v| self.push(v)).collect();
                self.objects[index as usize] = Flat::Dictionary(keys, values);
                index
            }
            _ => self.reserve(Flat::Leaf(value)),
        }
    }

    fn push_key(&mut self, key: &'a str) -> u64 {
        if let Some(&index) = self.strings.get(key) {
            return index;
        }
        let index = self.objects.len() as u64;
        self.objects.push(Flat::Key(key));
        self.strings.insert(key, index);
        index
    }

    fn reserve(&mut self, entry: Flat<'a>) -> u64 {
        self.objects.push(entry);
        (self.objects.len() - 1) as u64
    }
}

fn write_object(out: &mut Vec<u8>, object: &Flat<'_>, ref_size: usize) {
    match object {
        Flat::Leaf(value) => write_leaf(out, value),
        Flat::Key(key) => write_string(out, key),
        Flat::Array(refs) => {
            write_marker(out, 0xa, refs.len());
            for r in refs {
                write_uint(out, *r, ref_size);
            }
        }
        Flat::Dictionary(keys, values) => {
            write_marker(out, 0xd, keys.len());
            for r in keys.iter().chain(values) {
                write_uint(out, *r, ref_size);
            }
        }
    }
}

fn write_leaf(out: &mut Vec<u8>, value: &Plist) {
    match value {
        Plist::Null => out.push(0x00),
        Plist::Bool(false) => out.push(0x08),
        Plist::Bool(true) => out.push(0x09),
        Plist::Integer(v) => write_int(out, *v),
        Plist::Real(v) => {
            out.push(0x23);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Plist::Date(v) => {
            out.push(0x33);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Plist::Data(bytes) => {
            write_marker(out, 0x4, bytes.len());
            out.extend_from_slice(bytes);
        }
        Plist::String(s) => write_string(out, s),
        Plist::Uid(uid) => {
            let width = width_for(uid.get());
            out.push(0x80 | (width as u8 - 1));
            write_uint(out, uid.get(), width);
        }
        // Containers are flattened before they reach the writer.
        Plist::Array(_) | Plist::Dictionary(_) => {}
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    if s.is_ascii() {
        write_marker(out, 0x5, s.len());
        out.extend_from_slice(s.as_bytes());
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        write_marker(out, 0x6, units.len());
        for unit in units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
}

fn write_marker(out: &mut Vec<u8>, kind: u8, len: usize) {
    if len < 0x0f {
        out.push((kind << 4) | len as u8);
    } else {
        out.push((kind << 4) | 0x0f);
        write_int(out, len as i64);
    }
}

/// Integers use the narrowest unsigned width that fits; negative values and
/// anything above `u32::MAX` take the signed 8-byte form.
fn write_int(out: &mut Vec<u8>, v: i64) {
    match v {
        0..=0xff => {
            out.push(0x10);
            out.push(v as u8);
        }
        0x100..=0xffff => {
            out.push(0x11);
            out.extend_from_slice(&(v as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0x12);
            out.extend_from_slice(&(v as u32).to_be_bytes());
        }
        _ => {
            out.push(0x13);
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
}

fn write_uint(out: &mut Vec<u8>, v: u64, width: usize) {
    out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
}

fn width_for(max: u64) -> usize {
    match max {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xffff_ffff => 4,
        _ => 8,
    }
}
