//! # Live Object Model
//!
//! Application objects live in an [`ObjectGraph`]: an arena of boxed
//! [`Archivable`] values addressed by [`ObjectId`]. Two fields that hold the
//! same `ObjectId` share one object; an object whose fields lead back to its
//! own id forms a cycle. The arena owns every object, so cycles never leak
//! and the whole graph can be moved across threads.
//!
//! ## The `Archivable` capability
//!
//! An archivable type reports its own type name and introspects itself into
//! named fields ([`Archivable::encode_fields`]). On the decode path a
//! default-constructed instance is populated one field at a time
//! ([`Archivable::decode_field`]) and then checked as a whole
//! ([`Archivable::finish_decoding`]).
//!
//! `decode_field` receives object fields as [`ObjectId`]s that may refer to
//! instances still under construction (that is how cycles close), so
//! implementations store the id and do not inspect the target.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use sarc_core::frame::BASE_CLASS;
use sarc_core::{ArchiveError, FieldError};

/// Handle to an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Position of the object in its graph's arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value held in a field, in a collection, or at the root of a graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    /// Ordered member list. Has no identity of its own.
    Array(Vec<Value>),
    Object(ObjectId),
}

impl Value {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Data(_) => "data",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Real value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(r) => Some(*r),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    // -- Field coercions used by `decode_field` implementations ----------

    pub fn expect_bool(self) -> Result<bool, FieldError> {
        self.as_bool().ok_or_else(|| self.mismatch("bool"))
    }

    pub fn expect_i64(self) -> Result<i64, FieldError> {
        self.as_i64().ok_or_else(|| self.mismatch("integer"))
    }

    pub fn expect_f64(self) -> Result<f64, FieldError> {
        self.as_f64().ok_or_else(|| self.mismatch("real"))
    }

    pub fn into_string(self) -> Result<String, FieldError> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn into_data(self) -> Result<Vec<u8>, FieldError> {
        match self {
            Self::Data(d) => Ok(d),
            other => Err(other.mismatch("data")),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>, FieldError> {
        match self {
            Self::Array(items) => Ok(items),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn expect_object(self) -> Result<ObjectId, FieldError> {
        self.as_object().ok_or_else(|| self.mismatch("object"))
    }

    /// `Null` maps to `None`; anything but an object is a mismatch.
    pub fn into_optional_object(self) -> Result<Option<ObjectId>, FieldError> {
        match self {
            Self::Null => Ok(None),
            Self::Object(id) => Ok(Some(id)),
            other => Err(other.mismatch("object or null")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> FieldError {
        FieldError::TypeMismatch {
            expected,
            found: self.kind_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(d: Vec<u8>) -> Self {
        Self::Data(d)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

impl From<Option<ObjectId>> for Value {
    fn from(id: Option<ObjectId>) -> Self {
        id.map_or(Self::Null, Self::Object)
    }
}

/// Upcast helper so `dyn Archivable` can be downcast to its concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A type that can be written to and read from a keyed archive.
pub trait Archivable: AsAny + fmt::Debug + Send + 'static {
    /// Archived type name. Must be non-empty and must not start with `$`.
    fn class_name(&self) -> &str;

    /// The class followed by its ancestors, most specific first.
    fn class_chain(&self) -> Vec<String> {
        vec![self.class_name().to_string(), BASE_CLASS.to_string()]
    }

    /// Write every field into `fields`.
    ///
    /// The default implementation reports the type as not introspectable,
    /// which fails the encode with [`ArchiveError::UnsupportedEncodeType`].
    fn encode_fields(&self, fields: &mut FieldWriter) -> Result<(), ArchiveError> {
        let _ = fields;
        Err(ArchiveError::UnsupportedEncodeType {
            type_name: self.class_name().to_string(),
            reason: "type does not expose its fields".to_string(),
        })
    }

    /// Store one decoded field. Unknown keys should be ignored.
    fn decode_field(&mut self, key: &str, value: Value) -> Result<(), FieldError>;

    /// Called once after every field has been supplied.
    fn finish_decoding(&mut self) -> Result<(), FieldError> {
        Ok(())
    }
}

/// Ordered field sink handed to [`Archivable::encode_fields`].
#[derive(Debug, Default)]
pub struct FieldWriter {
    fields: IndexMap<String, Value>,
}

impl FieldWriter {
    /// Record a field. A repeated key replaces the earlier value.
    pub fn encode(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_fields(self) -> IndexMap<String, Value> {
        self.fields
    }
}

/// Arena owning a graph of archivable objects plus its root value.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    objects: Vec<Box<dyn Archivable>>,
    root: Value,
}

impl ObjectGraph {
    /// An empty graph with a `Null` root.
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph whose root is a plain value with no objects.
    pub fn from_value(root: impl Into<Value>) -> Self {
        Self {
            objects: Vec::new(),
            root: root.into(),
        }
    }

    /// Move an object into the arena.
    pub fn insert<T: Archivable>(&mut self, object: T) -> ObjectId {
        self.insert_boxed(Box::new(object))
    }

    pub fn insert_boxed(&mut self, object: Box<dyn Archivable>) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<Value>) {
        self.root = root.into();
    }

    /// The root as an object id, if the root is an object.
    pub fn root_object(&self) -> Option<ObjectId> {
        self.root.as_object()
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn Archivable> {
        self.objects.get(id.0).map(|object| &**object)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut dyn Archivable> {
        match self.objects.get_mut(id.0) {
            Some(object) => Some(&mut **object),
            None => None,
        }
    }

    pub fn downcast_ref<T: Archivable>(&self, id: ObjectId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Archivable>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// The root object downcast to `T`.
    pub fn root_as<T: Archivable>(&self) -> Option<&T> {
        self.downcast_ref(self.root_object()?)
    }

    pub fn class_name(&self, id: ObjectId) -> Option<&str> {
        self.get(id).map(|object| object.class_name())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(ObjectId)
    }
}
