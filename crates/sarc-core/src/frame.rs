//! # Keyed-Archive Frame
//!
//! Lifts the top-level property list of a keyed archive into an
//! [`ArchiveFrame`]: a flat object table plus named root slots.
//!
//! ```text
//! {
//!   "$version":  100000,
//!   "$archiver": "NSKeyedArchiver",
//!   "$top":      { "root": UID(1) },
//!   "$objects":  [ "$null", { "$class": UID(2), "NS.time": 0.0 },
//!                  { "$classname": "NSDate", "$classes": ["NSDate", "NSObject"] } ]
//! }
//! ```
//!
//! Converting to a frame is the whole of the "parsing phase": it checks the
//! layout and classifies every table entry, but never resolves a reference
//! and never looks at a type name beyond storing it.

use indexmap::IndexMap;

use crate::bplist::{self, ParseLimits};
use crate::error::{ArchiveError, FramingError};
use crate::plist::Plist;
use crate::uid::Uid;

/// Value of `$archiver` written by, and required from, conforming archives.
pub const ARCHIVER_NAME: &str = "NSKeyedArchiver";

/// Value of `$version` written by, and required from, conforming archives.
pub const ARCHIVE_VERSION: i64 = 100_000;

/// Table entry 0 of every archive.
pub const NULL_SENTINEL: &str = "$null";

/// `$top` key of the root slot.
pub const ROOT_KEY: &str = "root";

/// Class chain terminator appended to every descriptor.
pub const BASE_CLASS: &str = "NSObject";

const KEY_ARCHIVER: &str = "$archiver";
const KEY_VERSION: &str = "$version";
const KEY_TOP: &str = "$top";
const KEY_OBJECTS: &str = "$objects";
const KEY_CLASS: &str = "$class";
const KEY_CLASSNAME: &str = "$classname";
const KEY_CLASSES: &str = "$classes";

/// One value in the object table, or inline inside a typed object.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    /// Index into the object table.
    Reference(Uid),
    /// Inline member list of a collection object.
    Array(Vec<ArchiveValue>),
    /// Instance of an archived type.
    Object(TypedObject),
    /// Class descriptor shared by all instances of one type.
    Class(ClassDescriptor),
}

impl ArchiveValue {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Data(_) => "data",
            Self::Reference(_) => "reference",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Class(_) => "class",
        }
    }
}

/// An archived object: a reference to its class descriptor and its fields
/// in archive order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedObject {
    pub class: Uid,
    pub fields: IndexMap<String, ArchiveValue>,
}

/// `{ "$classname": ..., "$classes": [...] }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: String,
    /// The class followed by its ancestors, most specific first.
    pub chain: Vec<String>,
}

impl ClassDescriptor {
    /// Descriptor for a class whose only ancestor is the base class.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let chain = vec![name.clone(), BASE_CLASS.to_string()];
        Self { name, chain }
    }
}

/// A parsed keyed archive: named root slots and the flat object table.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveFrame {
    pub top: IndexMap<String, Uid>,
    pub objects: Vec<ArchiveValue>,
}

impl Default for ArchiveFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFrame {
    /// An empty frame holding only the `$null` sentinel.
    pub fn new() -> Self {
        Self {
            top: IndexMap::new(),
            objects: vec![ArchiveValue::Null],
        }
    }

    /// The root slot, if present.
    pub fn root(&self) -> Option<Uid> {
        self.top.get(ROOT_KEY).copied()
    }

    /// Look up a table entry.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::OutOfRangeReference`] when `uid` is past the table.
    pub fn get(&self, uid: Uid) -> Result<&ArchiveValue, ArchiveError> {
        uid.as_index()
            .and_then(|i| self.objects.get(i))
            .ok_or(ArchiveError::OutOfRangeReference {
                uid: uid.get(),
                table_len: self.objects.len(),
            })
    }

    /// Parse bytes into a frame. This is the complete parsing phase.
    pub fn from_bytes(data: &[u8], limits: &ParseLimits) -> Result<Self, ArchiveError> {
        let document = bplist::from_bytes(data, limits)?;
        Ok(Self::from_plist(document)?)
    }

    /// Serialize the frame as a `bplist00` document.
    pub fn to_bytes(&self) -> Vec<u8> {
        bplist::to_bytes(&self.to_plist())
    }

    /// Validate the keyed-archive layout and classify every table entry.
    pub fn from_plist(document: Plist) -> Result<Self, FramingError> {
        let mut root = match document {
            Plist::Dictionary(map) => map,
            other => {
                return Err(FramingError::UnexpectedShape(format!(
                    "archive root is a {}, expected dictionary",
                    other.kind_name()
                )))
            }
        };
        check_header(&root)?;

        let top = match root.get(KEY_TOP) {
            Some(Plist::Dictionary(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_uid().map(|uid| (k.clone(), uid)))
                .collect(),
            Some(_) => return Err(FramingError::UnexpectedShape("$top is not a dictionary".to_string())),
            None => return Err(FramingError::MissingKey(KEY_TOP)),
        };

        let objects = match root.swap_remove(KEY_OBJECTS) {
            Some(Plist::Array(items)) => items
                .into_iter()
                .map(entry_from_plist)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(FramingError::UnexpectedShape("$objects is not an array".to_string())),
            None => return Err(FramingError::MissingKey(KEY_OBJECTS)),
        };

        Ok(Self { top, objects })
    }

    /// Build the top-level property list of this frame.
    pub fn to_plist(&self) -> Plist {
        let mut top = IndexMap::with_capacity(self.top.len());
        for (k, uid) in &self.top {
            top.insert(k.clone(), Plist::Uid(*uid));
        }
        let mut map = IndexMap::with_capacity(4);
        map.insert(KEY_VERSION.to_string(), Plist::Integer(ARCHIVE_VERSION));
        map.insert(KEY_ARCHIVER.to_string(), Plist::from(ARCHIVER_NAME));
        map.insert(KEY_TOP.to_string(), Plist::Dictionary(top));
        map.insert(
            KEY_OBJECTS.to_string(),
            Plist::Array(self.objects.iter().map(entry_to_plist).collect()),
        );
        Plist::Dictionary(map)
    }
}

/// Read one `$top` slot straight from archive bytes.
///
/// Only the header entries and `$top` are parsed. `$objects` is never read,
/// so the cost does not grow with the object table.
pub fn peek_top_slot(data: &[u8], key: &str, limits: &ParseLimits) -> Result<Uid, ArchiveError> {
    let document = bplist::top_level_entries(data, &[KEY_ARCHIVER, KEY_VERSION, KEY_TOP], limits)?;
    Ok(top_slot(&document, key)?)
}

/// Read one `$top` slot from a parsed document without touching `$objects`.
///
/// Checks the archiver header so that arbitrary property lists that happen
/// to contain a `$top` key are not mistaken for archives.
pub fn top_slot(document: &Plist, key: &str) -> Result<Uid, FramingError> {
    let root = document
        .as_dictionary()
        .ok_or_else(|| FramingError::UnexpectedShape("archive root is not a dictionary".to_string()))?;
    check_header(root)?;
    let top = root
        .get(KEY_TOP)
        .and_then(Plist::as_dictionary)
        .ok_or(FramingError::MissingKey(KEY_TOP))?;
    top.get(key)
        .and_then(Plist::as_uid)
        .ok_or_else(|| FramingError::UnexpectedShape(format!("$top has no UID for \"{key}\"")))
}

fn check_header(root: &IndexMap<String, Plist>) -> Result<(), FramingError> {
    match root.get(KEY_ARCHIVER) {
        Some(Plist::String(name)) if name == ARCHIVER_NAME => {}
        Some(Plist::String(name)) => return Err(FramingError::WrongArchiver(name.clone())),
        Some(_) => return Err(FramingError::UnexpectedShape("$archiver is not a string".to_string())),
        None => return Err(FramingError::MissingKey(KEY_ARCHIVER)),
    }
    match root.get(KEY_VERSION) {
        Some(Plist::Integer(ARCHIVE_VERSION)) => Ok(()),
        Some(Plist::Integer(v)) => Err(FramingError::UnsupportedVersion(*v)),
        Some(_) => Err(FramingError::UnexpectedShape("$version is not an integer".to_string())),
        None => Err(FramingError::MissingKey(KEY_VERSION)),
    }
}

fn entry_from_plist(entry: Plist) -> Result<ArchiveValue, FramingError> {
    match entry {
        Plist::String(s) if s == NULL_SENTINEL => Ok(ArchiveValue::Null),
        Plist::Dictionary(mut map) => {
            if let Some(class) = map.swap_remove(KEY_CLASS) {
                let class = class
                    .as_uid()
                    .ok_or_else(|| FramingError::UnexpectedShape("$class is not a UID".to_string()))?;
                let fields = map
                    .into_iter()
                    .map(|(k, v)| inline_from_plist(v).map(|v| (k, v)))
                    .collect::<Result<IndexMap<_, _>, _>>()?;
                Ok(ArchiveValue::Object(TypedObject { class, fields }))
            } else if let Some(name) = map.get(KEY_CLASSNAME) {
                let name = name
                    .as_str()
                    .ok_or_else(|| FramingError::UnexpectedShape("$classname is not a string".to_string()))?
                    .to_string();
                let chain = match map.get(KEY_CLASSES) {
                    Some(Plist::Array(items)) => items
                        .iter()
                        .map(|p| {
                            p.as_str().map(str::to_string).ok_or_else(|| {
                                FramingError::UnexpectedShape("$classes holds a non-string".to_string())
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(_) => {
                        return Err(FramingError::UnexpectedShape("$classes is not an array".to_string()))
                    }
                    None => vec![name.clone()],
                };
                Ok(ArchiveValue::Class(ClassDescriptor { name, chain }))
            } else {
                Err(FramingError::UnexpectedShape(
                    "table dictionary has neither $class nor $classname".to_string(),
                ))
            }
        }
        other => inline_from_plist(other),
    }
}

fn inline_from_plist(value: Plist) -> Result<ArchiveValue, FramingError> {
    Ok(match value {
        Plist::Null => ArchiveValue::Null,
        Plist::Bool(b) => ArchiveValue::Bool(b),
        Plist::Integer(i) => ArchiveValue::Integer(i),
        Plist::Real(r) | Plist::Date(r) => ArchiveValue::Real(r),
        Plist::Data(d) => ArchiveValue::Data(d),
        Plist::String(s) => ArchiveValue::String(s),
        Plist::Uid(uid) => ArchiveValue::Reference(uid),
        Plist::Array(items) => ArchiveValue::Array(
            items
                .into_iter()
                .map(inline_from_plist)
                .collect::<Result<_, _>>()?,
        ),
        Plist::Dictionary(_) => {
            return Err(FramingError::UnexpectedShape(
                "dictionary nested inside an archived value".to_string(),
            ))
        }
    })
}

fn entry_to_plist(entry: &ArchiveValue) -> Plist {
    match entry {
        ArchiveValue::Null => Plist::from(NULL_SENTINEL),
        ArchiveValue::Object(object) => {
            let mut map = IndexMap::with_capacity(object.fields.len() + 1);
            map.insert(KEY_CLASS.to_string(), Plist::Uid(object.class));
            for (k, v) in &object.fields {
                map.insert(k.clone(), inline_to_plist(v));
            }
            Plist::Dictionary(map)
        }
        ArchiveValue::Class(descriptor) => {
            let mut map = IndexMap::with_capacity(2);
            map.insert(
                KEY_CLASSES.to_string(),
                Plist::Array(descriptor.chain.iter().map(|c| Plist::from(c.as_str())).collect()),
            );
            map.insert(KEY_CLASSNAME.to_string(), Plist::from(descriptor.name.as_str()));
            Plist::Dictionary(map)
        }
        other => inline_to_plist(other),
    }
}

fn inline_to_plist(value: &ArchiveValue) -> Plist {
    match value {
        ArchiveValue::Null => Plist::Uid(Uid::NULL),
        ArchiveValue::Bool(b) => Plist::Bool(*b),
        ArchiveValue::Integer(i) => Plist::Integer(*i),
        ArchiveValue::Real(r) => Plist::Real(*r),
        ArchiveValue::String(s) => Plist::from(s.as_str()),
        ArchiveValue::Data(d) => Plist::Data(d.clone()),
        ArchiveValue::Reference(uid) => Plist::Uid(*uid),
        ArchiveValue::Array(items) => Plist::Array(items.iter().map(inline_to_plist).collect()),
        // Objects and classes only exist as table entries.
        ArchiveValue::Object(_) | ArchiveValue::Class(_) => entry_to_plist(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> ArchiveFrame {
        let mut frame = ArchiveFrame::new();
        let mut fields = IndexMap::new();
        fields.insert("NS.time".to_string(), ArchiveValue::Real(12.5));
        frame.objects.push(ArchiveValue::Object(TypedObject {
            class: Uid::new(2),
            fields,
        }));
        frame.objects.push(ArchiveValue::Class(ClassDescriptor::new("NSDate")));
        frame.top.insert(ROOT_KEY.to_string(), Uid::new(1));
        frame
    }

    fn document_with(archiver: Plist, version: Plist) -> Plist {
        let mut top = IndexMap::new();
        top.insert("root".to_string(), Plist::Uid(Uid::new(0)));
        let mut map = IndexMap::new();
        map.insert("$archiver".to_string(), archiver);
        map.insert("$version".to_string(), version);
        map.insert("$top".to_string(), Plist::Dictionary(top));
        map.insert("$objects".to_string(), Plist::Array(vec![Plist::from("$null")]));
        Plist::Dictionary(map)
    }

    #[test]
    fn frame_survives_bytes() {
        let frame = sample_frame();
        let bytes = frame.to_bytes();
        let parsed = ArchiveFrame::from_bytes(&bytes, &ParseLimits::default()).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.root(), Some(Uid::new(1)));
    }

    #[test]
    fn layout_uses_keyed_archiver_keys() {
        let plist = sample_frame().to_plist();
        let map = plist.as_dictionary().unwrap();
        assert_eq!(map.get("$archiver"), Some(&Plist::from("NSKeyedArchiver")));
        assert_eq!(map.get("$version"), Some(&Plist::Integer(100_000)));
        let objects = match map.get("$objects") {
            Some(Plist::Array(items)) => items,
            other => panic!("unexpected $objects: {other:?}"),
        };
        assert_eq!(objects[0], Plist::from("$null"));
        let class = objects[2].as_dictionary().unwrap();
        assert_eq!(class.get("$classname"), Some(&Plist::from("NSDate")));
    }

    #[test]
    fn wrong_archiver_rejected() {
        let doc = document_with(Plist::from("SomethingElse"), Plist::Integer(100_000));
        assert_eq!(
            ArchiveFrame::from_plist(doc).unwrap_err(),
            FramingError::WrongArchiver("SomethingElse".to_string())
        );
    }

    #[test]
    fn wrong_version_rejected() {
        let doc = document_with(Plist::from("NSKeyedArchiver"), Plist::Integer(7));
        assert_eq!(
            ArchiveFrame::from_plist(doc).unwrap_err(),
            FramingError::UnsupportedVersion(7)
        );
    }

    #[test]
    fn non_dictionary_root_rejected() {
        let err = ArchiveFrame::from_plist(Plist::Integer(1)).unwrap_err();
        assert!(matches!(err, FramingError::UnexpectedShape(_)));
    }

    #[test]
    fn missing_objects_rejected() {
        let mut doc = document_with(Plist::from("NSKeyedArchiver"), Plist::Integer(100_000));
        if let Plist::Dictionary(map) = &mut doc {
            map.swap_remove("$objects");
        }
        assert_eq!(
            ArchiveFrame::from_plist(doc).unwrap_err(),
            FramingError::MissingKey("$objects")
        );
    }

    #[test]
    fn nested_dictionary_in_object_rejected() {
        let mut inner = IndexMap::new();
        inner.insert("x".to_string(), Plist::Integer(1));
        let mut obj = IndexMap::new();
        obj.insert("$class".to_string(), Plist::Uid(Uid::new(2)));
        obj.insert("field".to_string(), Plist::Dictionary(inner));
        let err = entry_from_plist(Plist::Dictionary(obj)).unwrap_err();
        assert!(matches!(err, FramingError::UnexpectedShape(_)));
    }

    #[test]
    fn class_without_chain_defaults_to_name() {
        let mut map = IndexMap::new();
        map.insert("$classname".to_string(), Plist::from("NSURL"));
        let entry = entry_from_plist(Plist::Dictionary(map)).unwrap();
        assert_eq!(
            entry,
            ArchiveValue::Class(ClassDescriptor {
                name: "NSURL".to_string(),
                chain: vec!["NSURL".to_string()],
            })
        );
    }

    #[test]
    fn default_object_points_at_null_class() {
        let object = TypedObject::default();
        assert!(object.class.is_null());
        assert!(object.fields.is_empty());
    }

    #[test]
    fn top_slot_reads_root_only() {
        let frame = sample_frame();
        assert_eq!(top_slot(&frame.to_plist(), ROOT_KEY), Ok(Uid::new(1)));
        assert!(top_slot(&frame.to_plist(), "missing").is_err());
    }

    #[test]
    fn peek_ignores_object_table_size() {
        let mut frame = sample_frame();
        for i in 0..200 {
            frame.objects.push(ArchiveValue::String(format!("filler {i}")));
        }
        let bytes = frame.to_bytes();
        let tight = ParseLimits {
            max_nodes: 64,
            ..ParseLimits::default()
        };
        assert!(ArchiveFrame::from_bytes(&bytes, &tight).is_err());
        assert_eq!(peek_top_slot(&bytes, ROOT_KEY, &tight).unwrap(), Uid::new(1));
        assert!(peek_top_slot(&bytes, "missing", &tight).is_err());
    }

    #[test]
    fn peek_checks_header() {
        let bytes = bplist::to_bytes(&document_with(Plist::from("Other"), Plist::Integer(100_000)));
        let err = peek_top_slot(&bytes, ROOT_KEY, &ParseLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedFraming(FramingError::WrongArchiver(_))));
    }

    #[test]
    fn get_reports_out_of_range() {
        let frame = sample_frame();
        let err = frame.get(Uid::new(10)).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::OutOfRangeReference { uid: 10, table_len: 3 }
        ));
    }
}
