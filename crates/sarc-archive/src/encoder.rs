//! # Graph Encoder
//!
//! Walks an [`ObjectGraph`] depth-first from its root and flattens it into
//! an [`ArchiveFrame`]. Each object is assigned a table slot the first time
//! it is reached; every later reach reuses that slot, which is how shared
//! references and cycles survive the trip. The slot is reserved before the
//! object's fields are walked, so a field leading back to the object
//! resolves to the reserved slot instead of recursing.
//!
//! Strings, byte buffers and class descriptors are written once per
//! distinct value.

use std::collections::HashMap;

use indexmap::IndexMap;
use sarc_core::frame::ROOT_KEY;
use sarc_core::{ArchiveError, ArchiveFrame, ArchiveValue, ClassDescriptor, TypedObject, Uid};

use crate::config::ArchiveLimits;
use crate::object::{Archivable, FieldWriter, ObjectGraph, ObjectId, Value};

/// Serializes object graphs under a set of resource limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Archiver {
    limits: ArchiveLimits,
}

impl Archiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    /// Encode `graph` as a binary keyed archive.
    pub fn archive(&self, graph: &ObjectGraph) -> Result<Vec<u8>, ArchiveError> {
        let frame = self.build_frame(graph)?;
        let bytes = frame.to_bytes();
        tracing::debug!(
            objects = graph.len(),
            entries = frame.objects.len(),
            bytes = bytes.len(),
            "archived object graph"
        );
        Ok(bytes)
    }

    /// Flatten `graph` into an object table without serializing it.
    pub fn build_frame(&self, graph: &ObjectGraph) -> Result<ArchiveFrame, ArchiveError> {
        let mut state = EncodeState {
            graph,
            limits: &self.limits,
            frame: ArchiveFrame::new(),
            objects: HashMap::new(),
            strings: HashMap::new(),
            data: HashMap::new(),
            classes: HashMap::new(),
        };
        let root = state.entry_for(graph.root(), 0)?;
        let mut frame = state.frame;
        frame.top.insert(ROOT_KEY.to_string(), root);
        Ok(frame)
    }
}

struct EncodeState<'g> {
    graph: &'g ObjectGraph,
    limits: &'g ArchiveLimits,
    frame: ArchiveFrame,
    objects: HashMap<ObjectId, Uid>,
    strings: HashMap<String, Uid>,
    data: HashMap<Vec<u8>, Uid>,
    classes: HashMap<String, Uid>,
}

impl EncodeState<'_> {
    /// Table slot holding `value`, appending entries as needed.
    fn entry_for(&mut self, value: &Value, depth: usize) -> Result<Uid, ArchiveError> {
        if depth > self.limits.max_depth {
            return Err(ArchiveError::LimitExceeded {
                limit: "max_depth",
                max: self.limits.max_depth as u64,
            });
        }
        match value {
            Value::Null => Ok(Uid::NULL),
            Value::Bool(b) => self.push(ArchiveValue::Bool(*b)),
            Value::Integer(i) => self.push(ArchiveValue::Integer(*i)),
            Value::Real(r) => self.push(ArchiveValue::Real(*r)),
            Value::String(s) => {
                if let Some(uid) = self.strings.get(s) {
                    return Ok(*uid);
                }
                let uid = self.push(ArchiveValue::String(s.clone()))?;
                self.strings.insert(s.clone(), uid);
                Ok(uid)
            }
            Value::Data(d) => {
                if let Some(uid) = self.data.get(d) {
                    return Ok(*uid);
                }
                let uid = self.push(ArchiveValue::Data(d.clone()))?;
                self.data.insert(d.clone(), uid);
                Ok(uid)
            }
            Value::Array(items) => {
                let uid = self.push(ArchiveValue::Null)?;
                let members = self.member_refs(items, depth + 1)?;
                self.frame.objects[slot(uid)] = ArchiveValue::Array(members);
                Ok(uid)
            }
            Value::Object(id) => self.encode_object(*id, depth),
        }
    }

    fn encode_object(&mut self, id: ObjectId, depth: usize) -> Result<Uid, ArchiveError> {
        if let Some(uid) = self.objects.get(&id) {
            return Ok(*uid);
        }
        let graph = self.graph;
        let object = graph.get(id).ok_or_else(|| ArchiveError::UnsupportedEncodeType {
            type_name: format!("object {id}"),
            reason: "id does not belong to this graph".to_string(),
        })?;
        let class_name = object.class_name();
        if class_name.is_empty() || class_name.starts_with('$') {
            return Err(ArchiveError::UnsupportedEncodeType {
                type_name: class_name.to_string(),
                reason: "type names must be non-empty and must not start with '$'".to_string(),
            });
        }

        let uid = self.push(ArchiveValue::Null)?;
        self.objects.insert(id, uid);
        let class = self.class_for(object)?;

        let mut writer = FieldWriter::default();
        object.encode_fields(&mut writer)?;
        let mut fields = IndexMap::with_capacity(writer.len());
        for (key, value) in writer.into_fields() {
            if key.starts_with('$') {
                return Err(ArchiveError::UnsupportedEncodeType {
                    type_name: class_name.to_string(),
                    reason: format!("field key \"{key}\" is reserved"),
                });
            }
            let inline = self.inline_for(&value, depth + 1)?;
            fields.insert(key, inline);
        }

        self.frame.objects[slot(uid)] = ArchiveValue::Object(TypedObject { class, fields });
        Ok(uid)
    }

    /// Field value as stored inside an object: scalars inline, everything
    /// else by reference.
    fn inline_for(&mut self, value: &Value, depth: usize) -> Result<ArchiveValue, ArchiveError> {
        Ok(match value {
            Value::Bool(b) => ArchiveValue::Bool(*b),
            Value::Integer(i) => ArchiveValue::Integer(*i),
            Value::Real(r) => ArchiveValue::Real(*r),
            Value::Array(items) => ArchiveValue::Array(self.member_refs(items, depth)?),
            Value::Null | Value::String(_) | Value::Data(_) | Value::Object(_) => {
                ArchiveValue::Reference(self.entry_for(value, depth)?)
            }
        })
    }

    fn member_refs(&mut self, items: &[Value], depth: usize) -> Result<Vec<ArchiveValue>, ArchiveError> {
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            members.push(ArchiveValue::Reference(self.entry_for(item, depth)?));
        }
        Ok(members)
    }

    fn class_for(&mut self, object: &dyn Archivable) -> Result<Uid, ArchiveError> {
        let name = object.class_name();
        if let Some(uid) = self.classes.get(name) {
            return Ok(*uid);
        }
        let descriptor = ClassDescriptor {
            name: name.to_string(),
            chain: object.class_chain(),
        };
        let uid = self.push(ArchiveValue::Class(descriptor))?;
        self.classes.insert(name.to_string(), uid);
        Ok(uid)
    }

    fn push(&mut self, entry: ArchiveValue) -> Result<Uid, ArchiveError> {
        if self.frame.objects.len() >= self.limits.max_objects {
            return Err(ArchiveError::LimitExceeded {
                limit: "max_objects",
                max: self.limits.max_objects as u64,
            });
        }
        self.frame.objects.push(entry);
        Ok(Uid::new((self.frame.objects.len() - 1) as u64))
    }
}

/// Table index of a slot this encoder appended.
fn slot(uid: Uid) -> usize {
    uid.get() as usize
}
