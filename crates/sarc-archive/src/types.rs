//! Built-in archivable types: the Foundation collections and value wrappers
//! that the standard registry admits.
//!
//! Mutable and immutable class names share one Rust type; the `mutable`
//! flag only decides which name is written back out.

use chrono::{DateTime, TimeZone, Utc};
use sarc_core::{ArchiveError, FieldError};

use crate::object::{Archivable, FieldWriter, ObjectId, Value};

/// Member list of array and set objects.
pub const KEY_OBJECTS: &str = "NS.objects";
/// Key list of dictionary objects.
pub const KEY_KEYS: &str = "NS.keys";
pub const KEY_TIME: &str = "NS.time";
pub const KEY_BASE: &str = "NS.base";
pub const KEY_RELATIVE: &str = "NS.relative";
pub const KEY_STRING: &str = "NS.string";
pub const KEY_BYTES: &str = "NS.bytes";

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub const REFERENCE_EPOCH_UNIX: i64 = 978_307_200;

fn pick(mutable: bool, immutable_name: &'static str, mutable_name: &'static str) -> &'static str {
    if mutable {
        mutable_name
    } else {
        immutable_name
    }
}

/// Ordered collection (`NSArray` / `NSMutableArray`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NsArray {
    pub items: Vec<Value>,
    pub mutable: bool,
}

impl NsArray {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            mutable: false,
        }
    }

    pub fn mutable() -> Self {
        Self {
            items: Vec::new(),
            mutable: true,
        }
    }
}

impl Archivable for NsArray {
    fn class_name(&self) -> &str {
        pick(self.mutable, "NSArray", "NSMutableArray")
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_OBJECTS, Value::Array(self.items.clone()));
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        if key == KEY_OBJECTS {
            self.items = value.into_array()?;
        }
        Ok(())
    }
}

/// Key/value collection (`NSDictionary` / `NSMutableDictionary`), stored as
/// two parallel lists in archive order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NsDictionary {
    keys: Vec<Value>,
    values: Vec<Value>,
    pub mutable: bool,
}

impl NsDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutable() -> Self {
        Self {
            mutable: true,
            ..Self::default()
        }
    }

    /// Append an entry. A key equal to an existing one replaces its value.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.keys.iter().position(|k| *k == key) {
            Some(index) => self.values[index] = value,
            None => {
                self.keys.push(key);
                self.values.push(value);
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let index = self.keys.iter().position(|k| k == key)?;
        self.values.get(index)
    }

    /// Lookup by string key.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        let index = self.keys.iter().position(|k| k.as_str() == Some(key))?;
        self.values.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.keys.iter().zip(&self.values)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Archivable for NsDictionary {
    fn class_name(&self) -> &str {
        pick(self.mutable, "NSDictionary", "NSMutableDictionary")
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_KEYS, Value::Array(self.keys.clone()));
        fields.encode(KEY_OBJECTS, Value::Array(self.values.clone()));
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        match key {
            KEY_KEYS => self.keys = value.into_array()?,
            KEY_OBJECTS => self.values = value.into_array()?,
            _ => {}
        }
        Ok(())
    }

    fn finish_decoding(&mut self) -> Result<(), FieldError> {
        if self.keys.len() != self.values.len() {
            return Err(FieldError::LengthMismatch {
                left: self.keys.len(),
                right: self.values.len(),
            });
        }
        Ok(())
    }
}

/// Unordered collection (`NSSet` / `NSMutableSet`). Members keep archive
/// order; duplicates are not collapsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NsSet {
    pub items: Vec<Value>,
    pub mutable: bool,
}

impl NsSet {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            mutable: false,
        }
    }

    pub fn mutable() -> Self {
        Self {
            items: Vec::new(),
            mutable: true,
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }
}

impl Archivable for NsSet {
    fn class_name(&self) -> &str {
        pick(self.mutable, "NSSet", "NSMutableSet")
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_OBJECTS, Value::Array(self.items.clone()));
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        if key == KEY_OBJECTS {
            self.items = value.into_array()?;
        }
        Ok(())
    }
}

/// Point in time as seconds relative to 2001-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NsDate {
    pub seconds_since_reference: f64,
}

impl NsDate {
    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        let seconds = (time.timestamp() - REFERENCE_EPOCH_UNIX) as f64
            + f64::from(time.timestamp_subsec_nanos()) / 1e9;
        Self {
            seconds_since_reference: seconds,
        }
    }

    /// `None` when the stored offset is not finite or falls outside the
    /// range chrono can represent.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let seconds = self.seconds_since_reference;
        if !seconds.is_finite() {
            return None;
        }
        let whole = seconds.floor();
        let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
        let unix = (whole as i64).checked_add(REFERENCE_EPOCH_UNIX)?;
        Utc.timestamp_opt(unix, nanos).single()
    }
}

impl Archivable for NsDate {
    fn class_name(&self) -> &str {
        "NSDate"
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_TIME, self.seconds_since_reference);
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        if key == KEY_TIME {
            self.seconds_since_reference = value.expect_f64()?;
        }
        Ok(())
    }
}

/// URL string with an optional base URL object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NsUrl {
    pub base: Option<ObjectId>,
    pub relative: String,
}

impl NsUrl {
    pub fn new(relative: impl Into<String>) -> Self {
        Self {
            base: None,
            relative: relative.into(),
        }
    }

    pub fn with_base(base: ObjectId, relative: impl Into<String>) -> Self {
        Self {
            base: Some(base),
            relative: relative.into(),
        }
    }
}

impl Archivable for NsUrl {
    fn class_name(&self) -> &str {
        "NSURL"
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_BASE, self.base);
        fields.encode(KEY_RELATIVE, self.relative.as_str());
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        match key {
            KEY_BASE => self.base = value.into_optional_object()?,
            KEY_RELATIVE => self.relative = value.into_string()?,
            _ => {}
        }
        Ok(())
    }

    fn finish_decoding(&mut self) -> Result<(), FieldError> {
        if self.relative.is_empty() {
            return Err(FieldError::Missing);
        }
        Ok(())
    }
}

/// Boxed string (`NSMutableString`). Plain strings are archived as values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NsMutableString {
    pub value: String,
}

impl Archivable for NsMutableString {
    fn class_name(&self) -> &str {
        "NSMutableString"
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_STRING, self.value.as_str());
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        if key == KEY_STRING {
            self.value = value.into_string()?;
        }
        Ok(())
    }
}

/// Boxed byte buffer (`NSMutableData`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NsMutableData {
    pub bytes: Vec<u8>,
}

impl Archivable for NsMutableData {
    fn class_name(&self) -> &str {
        "NSMutableData"
    }

    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        fields.encode(KEY_BYTES, self.bytes.clone());
        Ok(())
    }

    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError> {
        if key == KEY_BYTES {
            self.bytes = value.into_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutable_flag_selects_class_name() {
        assert_eq!(NsArray::default().class_name(), "NSArray");
        assert_eq!(NsArray::mutable().class_name(), "NSMutableArray");
        assert_eq!(NsDictionary::mutable().class_name(), "NSMutableDictionary");
        assert_eq!(NsSet::mutable().class_name(), "NSMutableSet");
    }

    #[test]
    fn dictionary_insert_replaces_equal_key() {
        let mut dict = NsDictionary::new();
        dict.insert("a", 1i64);
        dict.insert("b", 2i64);
        dict.insert("a", 3i64);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get_str("a"), Some(&Value::Integer(3)));
        assert_eq!(dict.get(&Value::from("b")), Some(&Value::Integer(2)));
        assert_eq!(dict.get_str("missing"), None);
    }

    #[test]
    fn dictionary_rejects_unbalanced_lists() {
        let mut dict = NsDictionary::new();
        dict.decode_field(KEY_KEYS, Value::Array(vec!["a".into(), "b".into()]))
            .unwrap();
        dict.decode_field(KEY_OBJECTS, Value::Array(vec![1i64.into()]))
            .unwrap();
        assert_eq!(
            dict.finish_decoding(),
            Err(FieldError::LengthMismatch { left: 2, right: 1 })
        );
    }

    #[test]
    fn array_rejects_non_array_members() {
        let mut array = NsArray::default();
        let err = array.decode_field(KEY_OBJECTS, Value::Integer(1)).unwrap_err();
        assert!(matches!(err, FieldError::TypeMismatch { expected: "array", .. }));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut array = NsArray::default();
        array.decode_field("NS.extra", Value::Integer(1)).unwrap();
        assert!(array.items.is_empty());
    }

    #[test]
    fn date_reference_epoch() {
        let epoch = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(NsDate::from_datetime(epoch).seconds_since_reference, 0.0);

        let date = NsDate {
            seconds_since_reference: 86_400.5,
        };
        let time = date.to_datetime().unwrap();
        assert_eq!(time.to_rfc3339(), "2001-01-02T00:00:00.500+00:00");
        assert_eq!(NsDate::from_datetime(time), date);
    }

    #[test]
    fn date_rejects_non_finite_offsets() {
        let date = NsDate {
            seconds_since_reference: f64::NAN,
        };
        assert!(date.to_datetime().is_none());
        let date = NsDate {
            seconds_since_reference: 1e300,
        };
        assert!(date.to_datetime().is_none());
    }

    #[test]
    fn date_accepts_integer_time() {
        let mut date = NsDate::default();
        date.decode_field(KEY_TIME, Value::Integer(60)).unwrap();
        assert_eq!(date.seconds_since_reference, 60.0);
    }

    #[test]
    fn url_requires_relative_string() {
        let mut url = NsUrl::default();
        url.decode_field(KEY_BASE, Value::Null).unwrap();
        assert_eq!(url.finish_decoding(), Err(FieldError::Missing));

        url.decode_field(KEY_RELATIVE, "https://example.com/".into())
            .unwrap();
        assert!(url.finish_decoding().is_ok());
    }
}
