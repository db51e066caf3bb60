use indexmap::IndexMap;

use super::{ParseLimits, BPLIST_MAGIC, TRAILER_LEN};
use crate::error::{ArchiveError, FramingError};
use crate::plist::Plist;
use crate::uid::Uid;

/// Parse a `bplist00` document into a [`Plist`] tree.
///
/// # Errors
///
/// Returns [`ArchiveError::MalformedFraming`] for any structural defect and
/// [`ArchiveError::LimitExceeded`] when `limits` are exceeded. Never panics.
pub fn from_bytes(data: &[u8], limits: &ParseLimits) -> Result<Plist, ArchiveError> {
    let trailer = Trailer::parse(data)?;
    if trailer.num_objects > limits.max_nodes as u64 {
        return Err(ArchiveError::limit("max_plist_nodes", limits.max_nodes));
    }
    Reader::new(data, trailer, limits).read_object(trailer.top_object, 0)
}

/// Parse only the entries of the top-level dictionary whose keys appear in
/// `keys`.
///
/// Every key of the top dictionary is read, but values under unselected
/// keys are never touched and do not count against `limits`. The result is
/// a dictionary holding the selected keys that are present, in document
/// order. A repeated key keeps its first value.
///
/// # Errors
///
/// As [`from_bytes`], plus [`FramingError::UnexpectedShape`] when the top
/// object is not a dictionary.
pub fn top_level_entries(data: &[u8], keys: &[&str], limits: &ParseLimits) -> Result<Plist, ArchiveError> {
    let trailer = Trailer::parse(data)?;
    let mut reader = Reader::new(data, trailer, limits);
    let offset = reader.object_offset(trailer.top_object)?;
    let marker = reader.slice(offset, 1)?[0];
    if marker >> 4 != 0xd {
        return Err(FramingError::UnexpectedShape("top object is not a dictionary".to_string()).into());
    }
    let (count, start) = reader.read_length(offset, marker & 0x0f)?;
    let refs = reader.read_refs(start, count.checked_mul(2).ok_or(FramingError::InvalidInteger(offset))?)?;
    let (key_refs, value_refs) = refs.split_at(count);
    reader.enter(trailer.top_object)?;

    let mut map = IndexMap::new();
    for (&k, &v) in key_refs.iter().zip(value_refs) {
        let key = match reader.read_object(k, 1)? {
            Plist::String(s) => s,
            _ => return Err(FramingError::NonStringKey(offset).into()),
        };
        if keys.contains(&key.as_str()) && !map.contains_key(&key) {
            let value = reader.read_object(v, 1)?;
            map.insert(key, value);
        }
    }
    Ok(Plist::Dictionary(map))
}

#[derive(Debug, Clone, Copy)]
struct Trailer {
    offset_size: usize,
    ref_size: usize,
    num_objects: u64,
    top_object: u64,
    offset_table: usize,
}

impl Trailer {
    fn parse(data: &[u8]) -> Result<Self, FramingError> {
        if data.len() < BPLIST_MAGIC.len() || &data[..BPLIST_MAGIC.len()] != BPLIST_MAGIC {
            return Err(FramingError::BadMagic);
        }
        let min_len = BPLIST_MAGIC.len() + TRAILER_LEN;
        if data.len() < min_len {
            return Err(FramingError::Truncated {
                offset: BPLIST_MAGIC.len(),
                needed: TRAILER_LEN,
                available: data.len() - BPLIST_MAGIC.len(),
            });
        }

        let trailer_start = data.len() - TRAILER_LEN;
        let t = &data[trailer_start..];
        let offset_size = usize::from(t[6]);
        let ref_size = usize::from(t[7]);
        let num_objects = be_u64(&t[8..16]);
        let top_object = be_u64(&t[16..24]);
        let offset_table = be_u64(&t[24..32]);

        if !(1..=8).contains(&offset_size) {
            return Err(FramingError::InvalidTrailer(format!(
                "offset width {offset_size} not in 1..=8"
            )));
        }
        if !(1..=8).contains(&ref_size) {
            return Err(FramingError::InvalidTrailer(format!(
                "reference width {ref_size} not in 1..=8"
            )));
        }
        if num_objects == 0 {
            return Err(FramingError::InvalidTrailer("zero objects".to_string()));
        }
        if top_object >= num_objects {
            return Err(FramingError::InvalidTrailer(format!(
                "top object {top_object} >= object count {num_objects}"
            )));
        }

        let offset_table = usize::try_from(offset_table)
            .ok()
            .filter(|&o| o >= BPLIST_MAGIC.len() && o <= trailer_start)
            .ok_or_else(|| {
                FramingError::InvalidTrailer(format!("offset table at {offset_table} outside document"))
            })?;
        let table_len = usize::try_from(num_objects)
            .ok()
            .and_then(|n| n.checked_mul(offset_size))
            .ok_or_else(|| FramingError::InvalidTrailer("offset table size overflows".to_string()))?;
        if offset_table
            .checked_add(table_len)
            .map_or(true, |end| end > trailer_start)
        {
            return Err(FramingError::Truncated {
                offset: offset_table,
                needed: table_len,
                available: trailer_start - offset_table,
            });
        }

        Ok(Self {
            offset_size,
            ref_size,
            num_objects,
            top_object,
            offset_table,
        })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    trailer: Trailer,
    limits: &'a ParseLimits,
    nodes: usize,
    /// String and data payload bytes copied out so far.
    bytes: usize,
    /// Containers currently being read, for cycle detection.
    stack: Vec<u64>,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], trailer: Trailer, limits: &'a ParseLimits) -> Self {
        Self {
            data,
            trailer,
            limits,
            nodes: 0,
            bytes: 0,
            stack: Vec::new(),
        }
    }

    /// Account for `len` payload bytes about to be copied.
    fn charge(&mut self, len: usize) -> Result<(), ArchiveError> {
        self.bytes = self.bytes.saturating_add(len);
        if self.bytes > self.limits.max_bytes {
            return Err(ArchiveError::limit("max_plist_bytes", self.limits.max_bytes));
        }
        Ok(())
    }

    fn read_object(&mut self, index: u64, depth: usize) -> Result<Plist, ArchiveError> {
        if depth > self.limits.max_depth {
            return Err(ArchiveError::limit("max_depth", self.limits.max_depth));
        }
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(ArchiveError::limit("max_plist_nodes", self.limits.max_nodes));
        }

        let offset = self.object_offset(index)?;
        let marker = self.slice(offset, 1)?[0];
        let low = marker & 0x0f;

        let value = match marker >> 4 {
            0x0 => match low {
                0x0 => Plist::Null,
                0x8 => Plist::Bool(false),
                0x9 => Plist::Bool(true),
                _ => return Err(unsupported(marker, offset)),
            },
            0x1 => Plist::Integer(self.read_int(offset + 1, low)?),
            0x2 => match low {
                2 => {
                    let b = self.slice(offset + 1, 4)?;
                    Plist::Real(f64::from(f32::from_be_bytes([b[0], b[1], b[2], b[3]])))
                }
                3 => Plist::Real(f64::from_bits(be_u64(self.slice(offset + 1, 8)?))),
                _ => return Err(unsupported(marker, offset)),
            },
            0x3 if low == 3 => Plist::Date(f64::from_bits(be_u64(self.slice(offset + 1, 8)?))),
            0x4 => {
                let (len, start) = self.read_length(offset, low)?;
                let bytes = self.slice(start, len)?;
                self.charge(len)?;
                Plist::Data(bytes.to_vec())
            }
            0x5 => {
                let (len, start) = self.read_length(offset, low)?;
                let bytes = self.slice(start, len)?;
                if !bytes.is_ascii() {
                    return Err(FramingError::InvalidString(offset).into());
                }
                self.charge(len)?;
                // ASCII is a subset of UTF-8.
                Plist::String(String::from_utf8_lossy(bytes).into_owned())
            }
            0x6 => {
                let (units, start) = self.read_length(offset, low)?;
                let byte_len = units
                    .checked_mul(2)
                    .ok_or(FramingError::InvalidString(offset))?;
                let bytes = self.slice(start, byte_len)?;
                self.charge(byte_len)?;
                let code_units = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
                let s: String = char::decode_utf16(code_units)
                    .collect::<Result<_, _>>()
                    .map_err(|_| FramingError::InvalidString(offset))?;
                Plist::String(s)
            }
            0x8 => {
                let width = usize::from(low) + 1;
                if width > 8 {
                    return Err(FramingError::InvalidInteger(offset).into());
                }
                Plist::Uid(Uid::new(be_uint(self.slice(offset + 1, width)?)))
            }
            0xa => {
                let (count, start) = self.read_length(offset, low)?;
                let refs = self.read_refs(start, count)?;
                self.enter(index)?;
                let mut items = Vec::with_capacity(refs.len());
                for r in refs {
                    items.push(self.read_object(r, depth + 1)?);
                }
                self.stack.pop();
                Plist::Array(items)
            }
            0xd => {
                let (count, start) = self.read_length(offset, low)?;
                let refs = self.read_refs(start, count.checked_mul(2).ok_or(FramingError::InvalidInteger(offset))?)?;
                let (key_refs, value_refs) = refs.split_at(count);
                self.enter(index)?;
                let mut map = IndexMap::with_capacity(count);
                for (&k, &v) in key_refs.iter().zip(value_refs) {
                    let key = match self.read_object(k, depth + 1)? {
                        Plist::String(s) => s,
                        _ => return Err(FramingError::NonStringKey(offset).into()),
                    };
                    let value = self.read_object(v, depth + 1)?;
                    map.insert(key, value);
                }
                self.stack.pop();
                Plist::Dictionary(map)
            }
            _ => return Err(unsupported(marker, offset)),
        };
        Ok(value)
    }

    fn enter(&mut self, index: u64) -> Result<(), FramingError> {
        if self.stack.contains(&index) {
            return Err(FramingError::ContainerCycle(index));
        }
        self.stack.push(index);
        Ok(())
    }

    fn object_offset(&self, index: u64) -> Result<usize, FramingError> {
        if index >= self.trailer.num_objects {
            return Err(FramingError::InvalidObjectRef {
                reference: index,
                count: self.trailer.num_objects,
            });
        }
        // index < num_objects and the table fits in the document, so this
        // multiplication cannot overflow.
        let entry = self.trailer.offset_table + index as usize * self.trailer.offset_size;
        let offset = be_uint(self.slice_any(entry, self.trailer.offset_size)?);
        usize::try_from(offset)
            .ok()
            .filter(|&o| o >= BPLIST_MAGIC.len() && o < self.trailer.offset_table)
            .ok_or(FramingError::InvalidOffset { index, offset })
    }

    fn read_refs(&self, start: usize, count: usize) -> Result<Vec<u64>, FramingError> {
        let width = self.trailer.ref_size;
        let len = count
            .checked_mul(width)
            .ok_or(FramingError::InvalidInteger(start))?;
        let bytes = self.slice(start, len)?;
        bytes
            .chunks_exact(width)
            .map(|chunk| {
                let r = be_uint(chunk);
                if r < self.trailer.num_objects {
                    Ok(r)
                } else {
                    Err(FramingError::InvalidObjectRef {
                        reference: r,
                        count: self.trailer.num_objects,
                    })
                }
            })
            .collect()
    }

    /// Decode the length hint of a variable-size object. Returns the length
    /// and the offset at which the payload starts.
    fn read_length(&self, offset: usize, low: u8) -> Result<(usize, usize), FramingError> {
        if low != 0x0f {
            return Ok((usize::from(low), offset + 1));
        }
        let int_marker = self.slice(offset + 1, 1)?[0];
        if int_marker >> 4 != 0x1 {
            return Err(FramingError::InvalidInteger(offset + 1));
        }
        let exp = int_marker & 0x0f;
        let len = self.read_int(offset + 2, exp)?;
        let len = usize::try_from(len).map_err(|_| FramingError::InvalidInteger(offset + 1))?;
        Ok((len, offset + 2 + (1usize << exp.min(4))))
    }

    fn read_int(&self, pos: usize, exp: u8) -> Result<i64, FramingError> {
        match exp {
            0..=2 => Ok(be_uint(self.slice(pos, 1usize << exp)?) as i64),
            3 => Ok(be_u64(self.slice(pos, 8)?) as i64),
            4 => {
                let bytes = self.slice(pos, 16)?;
                if bytes[..8].iter().any(|&b| b != 0) {
                    return Err(FramingError::InvalidInteger(pos));
                }
                i64::try_from(be_u64(&bytes[8..])).map_err(|_| FramingError::InvalidInteger(pos))
            }
            _ => Err(FramingError::InvalidInteger(pos)),
        }
    }

    /// A byte range inside the object area.
    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8], FramingError> {
        self.bounded(start, len, self.trailer.offset_table)
    }

    /// A byte range anywhere before the trailer.
    fn slice_any(&self, start: usize, len: usize) -> Result<&'a [u8], FramingError> {
        self.bounded(start, len, self.data.len() - TRAILER_LEN)
    }

    fn bounded(&self, start: usize, len: usize, end: usize) -> Result<&'a [u8], FramingError> {
        match start.checked_add(len) {
            Some(stop) if stop <= end => Ok(&self.data[start..stop]),
            _ => Err(FramingError::Truncated {
                offset: start,
                needed: len,
                available: end.saturating_sub(start),
            }),
        }
    }
}

fn unsupported(marker: u8, offset: usize) -> ArchiveError {
    FramingError::UnsupportedMarker { marker, offset }.into()
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

/// Big-endian unsigned integer of 1..=8 bytes.
fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bplist::to_bytes;

    fn limits() -> ParseLimits {
        ParseLimits::default()
    }

    /// Hand-assemble a document from object bodies.
    fn assemble(objects: &[Vec<u8>], top: u64, ref_size: u8) -> Vec<u8> {
        let mut out = BPLIST_MAGIC.to_vec();
        let mut offsets = Vec::new();
        for obj in objects {
            offsets.push(out.len() as u64);
            out.extend_from_slice(obj);
        }
        let table = out.len() as u64;
        for o in &offsets {
            out.extend_from_slice(&(*o as u16).to_be_bytes());
        }
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 2, ref_size]);
        out.extend_from_slice(&(objects.len() as u64).to_be_bytes());
        out.extend_from_slice(&top.to_be_bytes());
        out.extend_from_slice(&table.to_be_bytes());
        out
    }

    #[test]
    fn detects_self_referencing_array() {
        // Object 0: array with one element, referencing object 0.
        let doc = assemble(&[vec![0xa1, 0x00]], 0, 1);
        let err = from_bytes(&doc, &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::ContainerCycle(0))
        ));
    }

    #[test]
    fn shared_leaf_is_not_a_cycle() {
        // Array of two references to the same integer.
        let doc = assemble(&[vec![0xa2, 0x01, 0x01], vec![0x10, 0x07]], 0, 1);
        let value = from_bytes(&doc, &limits()).unwrap();
        assert_eq!(value, Plist::Array(vec![Plist::Integer(7), Plist::Integer(7)]));
    }

    #[test]
    fn rejects_out_of_range_element_ref() {
        let doc = assemble(&[vec![0xa1, 0x05]], 0, 1);
        let err = from_bytes(&doc, &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::InvalidObjectRef { reference: 5, .. })
        ));
    }

    #[test]
    fn rejects_non_string_keys() {
        let doc = assemble(&[vec![0xd1, 0x01, 0x01], vec![0x10, 0x01]], 0, 1);
        let err = from_bytes(&doc, &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::NonStringKey(_))
        ));
    }

    #[test]
    fn rejects_unknown_marker() {
        let doc = assemble(&[vec![0xc0]], 0, 1);
        let err = from_bytes(&doc, &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::UnsupportedMarker { marker: 0xc0, .. })
        ));
    }

    #[test]
    fn rejects_length_past_object_area() {
        // Data object claiming 14 bytes with only 2 present.
        let doc = assemble(&[vec![0x4e, 0xaa, 0xbb]], 0, 1);
        let err = from_bytes(&doc, &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::Truncated { .. })
        ));
    }

    #[test]
    fn sixteen_byte_integer_with_zero_high_half() {
        let mut body = vec![0x14];
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&42u64.to_be_bytes());
        let doc = assemble(&[body], 0, 1);
        assert_eq!(from_bytes(&doc, &limits()).unwrap(), Plist::Integer(42));
    }

    #[test]
    fn sixteen_byte_integer_with_high_bits_rejected() {
        let mut body = vec![0x14, 0x01];
        body.extend_from_slice(&[0u8; 15]);
        let doc = assemble(&[body], 0, 1);
        assert!(from_bytes(&doc, &limits()).is_err());
    }

    #[test]
    fn float32_widened() {
        let mut body = vec![0x22];
        body.extend_from_slice(&2.5f32.to_be_bytes());
        let doc = assemble(&[body], 0, 1);
        assert_eq!(from_bytes(&doc, &limits()).unwrap(), Plist::Real(2.5));
    }

    #[test]
    fn corrupt_trailer_widths_rejected() {
        let mut doc = to_bytes(&Plist::Integer(1));
        let len = doc.len();
        doc[len - TRAILER_LEN + 6] = 0;
        assert!(from_bytes(&doc, &limits()).is_err());
        doc[len - TRAILER_LEN + 6] = 9;
        assert!(from_bytes(&doc, &limits()).is_err());
    }

    #[test]
    fn top_object_beyond_count_rejected() {
        let mut doc = to_bytes(&Plist::Integer(1));
        let len = doc.len();
        doc[len - 9] = 0x10;
        let err = from_bytes(&doc, &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::InvalidTrailer(_))
        ));
    }

    #[test]
    fn node_budget_stops_fan_out() {
        // Each level references the next level twice: 2^20 leaves if expanded.
        let levels = 20u8;
        let mut objects = Vec::new();
        for i in 0..levels {
            objects.push(vec![0xa2, i + 1, i + 1]);
        }
        objects.push(vec![0x10, 0x00]);
        let doc = assemble(&objects, 0, 1);
        let tight = ParseLimits {
            max_nodes: 10_000,
            ..limits()
        };
        let err = from_bytes(&doc, &tight).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::LimitExceeded);
    }

    /// `levels` arrays, each holding two references to the next, ending in
    /// one data object of `leaf_len` bytes.
    fn doubling_chain(levels: u8, leaf_len: u16) -> Vec<Vec<u8>> {
        let mut objects: Vec<Vec<u8>> = (0..levels).map(|i| vec![0xa2, i + 1, i + 1]).collect();
        let mut leaf = vec![0x4f, 0x11];
        leaf.extend_from_slice(&leaf_len.to_be_bytes());
        leaf.extend(std::iter::repeat(0xab).take(usize::from(leaf_len)));
        objects.push(leaf);
        objects
    }

    #[test]
    fn byte_budget_stops_shared_payload() {
        // 2^12 copies of a 1000-byte leaf is about 4 MB from a 1 KB document.
        let doc = assemble(&doubling_chain(12, 1000), 0, 1);
        let tight = ParseLimits {
            max_bytes: 1024 * 1024,
            ..limits()
        };
        let err = from_bytes(&doc, &tight).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::LimitExceeded { limit: "max_plist_bytes", max } if max == 1024 * 1024
        ));
        assert!(from_bytes(&doc, &limits()).is_ok());
    }

    #[test]
    fn byte_budget_counts_keys_and_strings() {
        let mut map = IndexMap::new();
        map.insert("k".repeat(40), Plist::from("v".repeat(40)));
        let doc = to_bytes(&Plist::Dictionary(map));
        let tight = ParseLimits {
            max_bytes: 60,
            ..limits()
        };
        assert_eq!(from_bytes(&doc, &tight).unwrap_err().kind(), crate::ErrorKind::LimitExceeded);
    }

    /// `{ "small": 1, "huge": <doubling chain> }` with the chain unexpanded.
    fn document_with_huge_entry() -> Vec<u8> {
        let mut objects = vec![
            vec![0xd2, 0x01, 0x02, 0x03, 0x04],
            vec![0x55, b's', b'm', b'a', b'l', b'l'],
            vec![0x54, b'h', b'u', b'g', b'e'],
            vec![0x10, 0x01],
        ];
        let base = objects.len() as u8;
        for i in 0..22u8 {
            objects.push(vec![0xa2, base + i + 1, base + i + 1]);
        }
        objects.push(vec![0x10, 0x00]);
        assemble(&objects, 0, 1)
    }

    #[test]
    fn selected_entries_skip_other_values() {
        let doc = document_with_huge_entry();
        let tight = ParseLimits {
            max_nodes: 1000,
            ..limits()
        };
        assert!(from_bytes(&doc, &tight).is_err());

        let picked = top_level_entries(&doc, &["small", "absent"], &tight).unwrap();
        let map = picked.as_dictionary().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("small"), Some(&Plist::Integer(1)));
    }

    #[test]
    fn selected_entries_require_dictionary_top() {
        let doc = to_bytes(&Plist::Array(vec![Plist::Integer(1)]));
        let err = top_level_entries(&doc, &["x"], &limits()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedFraming(FramingError::UnexpectedShape(_))
        ));
    }

    #[test]
    fn every_truncation_returns() {
        let mut map = IndexMap::new();
        map.insert("k".to_string(), Plist::Array(vec![Plist::from("v"), Plist::Integer(9)]));
        let original = Plist::Dictionary(map);
        let doc = to_bytes(&original);
        for cut in 0..doc.len() {
            if let Ok(parsed) = from_bytes(&doc[..cut], &limits()) {
                assert_ne!(parsed, original, "cut at {cut} reproduced the full document");
            }
        }
        assert!(from_bytes(&doc[..TRAILER_LEN], &limits()).is_err());
        assert_eq!(from_bytes(&doc, &limits()).unwrap(), original);
    }
}
