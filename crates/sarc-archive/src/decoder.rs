//! # Allow-listed Decoder
//!
//! Decoding runs in two phases. The byte-level phase parses the property
//! list and checks the keyed-archive frame without instantiating anything.
//! The reconstruction phase walks the object table from the root slot and
//! builds an [`ObjectGraph`].
//!
//! Security properties:
//!
//! - A typed entry is instantiated only when its `$classname` is present
//!   in the [`TypeRegistry`]. The `$classes` ancestor chain is never
//!   consulted, so an archive cannot reach an allowed type by claiming it
//!   as a superclass.
//! - Only entries reachable from the root are visited. Unreachable entries
//!   naming disallowed types are never inspected.
//! - Every reference is bounds-checked, reference chains are bounded by
//!   `max_depth`, and a chain of non-object entries that loops back on
//!   itself is rejected. Object cycles are legal and close on the instance
//!   already allocated for the entry.
//! - Any failure discards the partially built graph.

use sarc_core::{ArchiveError, ArchiveFrame, ArchiveValue, FramingError, TypedObject, Uid};

use crate::config::ArchiveLimits;
use crate::object::{ObjectGraph, Value};
use crate::registry::TypeRegistry;

/// Key reported when [`Archivable::finish_decoding`](crate::Archivable::finish_decoding)
/// rejects an object.
pub const WHOLE_OBJECT_KEY: &str = "*";

/// Decodes keyed archives against an allow-list.
#[derive(Debug, Clone, Copy)]
pub struct Unarchiver<'r> {
    registry: &'r TypeRegistry,
    limits: ArchiveLimits,
}

impl<'r> Unarchiver<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            limits: ArchiveLimits::default(),
        }
    }

    pub fn with_limits(registry: &'r TypeRegistry, limits: ArchiveLimits) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Decode `data` into an object graph.
    pub fn unarchive(&self, data: &[u8]) -> Result<ObjectGraph, ArchiveError> {
        if data.len() > self.limits.max_input_bytes {
            return Err(ArchiveError::LimitExceeded {
                limit: "max_input_bytes",
                max: self.limits.max_input_bytes as u64,
            });
        }
        let frame = ArchiveFrame::from_bytes(data, &self.limits.parse_limits())?;
        self.reconstruct(&frame)
    }

    /// Like [`Unarchiver::unarchive`], collapsing every failure to `None`.
    /// The failure kind is logged.
    pub fn unarchive_opt(&self, data: &[u8]) -> Option<ObjectGraph> {
        match self.unarchive(data) {
            Ok(graph) => Some(graph),
            Err(err) if err.is_policy_violation() => {
                tracing::warn!(kind = %err.kind(), error = %err, "archive rejected by type allow-list");
                None
            }
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "archive could not be decoded");
                None
            }
        }
    }

    /// Rebuild the object graph described by an already parsed frame.
    pub fn reconstruct(&self, frame: &ArchiveFrame) -> Result<ObjectGraph, ArchiveError> {
        if frame.objects.len() > self.limits.max_objects {
            return Err(ArchiveError::LimitExceeded {
                limit: "max_objects",
                max: self.limits.max_objects as u64,
            });
        }
        let root = frame.root().ok_or(FramingError::MissingKey("root"))?;

        let mut state = DecodeState {
            frame,
            registry: self.registry,
            limits: &self.limits,
            graph: ObjectGraph::new(),
            slots: vec![Slot::Empty; frame.objects.len()],
        };
        let value = state.resolve(root, 0)?;
        let mut graph = state.graph;
        graph.set_root(value);
        tracing::debug!(
            objects = graph.len(),
            entries = frame.objects.len(),
            "unarchived object graph"
        );
        Ok(graph)
    }
}

/// Reconstruction progress of one table entry.
#[derive(Debug, Clone)]
enum Slot {
    Empty,
    InProgress,
    Done(Value),
}

struct DecodeState<'a> {
    frame: &'a ArchiveFrame,
    registry: &'a TypeRegistry,
    limits: &'a ArchiveLimits,
    graph: ObjectGraph,
    slots: Vec<Slot>,
}

impl<'a> DecodeState<'a> {
    /// Value of table entry `uid`, reconstructing it on first use.
    fn resolve(&mut self, uid: Uid, depth: usize) -> Result<Value, ArchiveError> {
        if depth > self.limits.max_depth {
            return Err(ArchiveError::LimitExceeded {
                limit: "max_depth",
                max: self.limits.max_depth as u64,
            });
        }
        let frame = self.frame;
        let index = uid
            .as_index()
            .filter(|&index| index < frame.objects.len())
            .ok_or(ArchiveError::OutOfRangeReference {
                uid: uid.get(),
                table_len: frame.objects.len(),
            })?;
        match &self.slots[index] {
            Slot::Done(value) => return Ok(value.clone()),
            Slot::InProgress => return Err(FramingError::CyclicEntry(uid.get()).into()),
            Slot::Empty => {}
        }

        let value = match &frame.objects[index] {
            ArchiveValue::Object(object) => return self.instantiate(index, object, depth),
            ArchiveValue::Class(class) => {
                return Err(FramingError::UnexpectedShape(format!(
                    "entry {uid} is the class descriptor \"{}\", not a value",
                    class.name
                ))
                .into());
            }
            ArchiveValue::Reference(target) => {
                self.slots[index] = Slot::InProgress;
                self.resolve(*target, depth + 1)?
            }
            ArchiveValue::Array(items) => {
                self.slots[index] = Slot::InProgress;
                Value::Array(self.members(items, depth + 1)?)
            }
            scalar => scalar_value(scalar)?,
        };
        self.slots[index] = Slot::Done(value.clone());
        Ok(value)
    }

    fn instantiate(
        &mut self,
        index: usize,
        object: &'a TypedObject,
        depth: usize,
    ) -> Result<Value, ArchiveError> {
        let class_name = self.class_name(object.class)?;
        let factory = self
            .registry
            .lookup(class_name)
            .ok_or_else(|| ArchiveError::DisallowedType {
                class_name: class_name.to_string(),
            })?;

        let id = self.graph.insert_boxed(factory());
        let handle = Value::Object(id);
        self.slots[index] = Slot::Done(handle.clone());

        for (key, field) in &object.fields {
            let value = self.inline(field, depth + 1)?;
            let target = self.graph.get_mut(id).ok_or_else(|| lost_object(class_name))?;
            target
                .decode_field(key, value)
                .map_err(|source| ArchiveError::FieldPopulation {
                    class_name: class_name.to_string(),
                    key: key.clone(),
                    source,
                })?;
        }
        let target = self.graph.get_mut(id).ok_or_else(|| lost_object(class_name))?;
        target
            .finish_decoding()
            .map_err(|source| ArchiveError::FieldPopulation {
                class_name: class_name.to_string(),
                key: WHOLE_OBJECT_KEY.to_string(),
                source,
            })?;
        Ok(handle)
    }

    /// Value of a field stored inside a typed object.
    fn inline(&mut self, value: &'a ArchiveValue, depth: usize) -> Result<Value, ArchiveError> {
        match value {
            ArchiveValue::Reference(uid) => self.resolve(*uid, depth),
            ArchiveValue::Array(items) => Ok(Value::Array(self.members(items, depth)?)),
            ArchiveValue::Object(_) | ArchiveValue::Class(_) => Err(FramingError::UnexpectedShape(
                format!("{} nested inside an object", value.kind_name()),
            )
            .into()),
            scalar => scalar_value(scalar),
        }
    }

    fn members(&mut self, items: &'a [ArchiveValue], depth: usize) -> Result<Vec<Value>, ArchiveError> {
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            members.push(self.inline(item, depth)?);
        }
        Ok(members)
    }

    /// Name of the class descriptor at `uid`.
    fn class_name(&self, uid: Uid) -> Result<&'a str, ArchiveError> {
        let frame = self.frame;
        match frame.get(uid)? {
            ArchiveValue::Class(class) => Ok(class.name.as_str()),
            other => Err(FramingError::UnexpectedShape(format!(
                "$class {uid} refers to a {} entry",
                other.kind_name()
            ))
            .into()),
        }
    }
}

fn scalar_value(entry: &ArchiveValue) -> Result<Value, ArchiveError> {
    Ok(match entry {
        ArchiveValue::Null => Value::Null,
        ArchiveValue::Bool(b) => Value::Bool(*b),
        ArchiveValue::Integer(i) => Value::Integer(*i),
        ArchiveValue::Real(r) => Value::Real(*r),
        ArchiveValue::String(s) => Value::String(s.clone()),
        ArchiveValue::Data(d) => Value::Data(d.clone()),
        other => {
            return Err(FramingError::UnexpectedShape(format!(
                "expected a scalar, found {}",
                other.kind_name()
            ))
            .into())
        }
    })
}

fn lost_object(class_name: &str) -> ArchiveError {
    FramingError::UnexpectedShape(format!("instance of \"{class_name}\" left the graph")).into()
}
