//! JSON views of object graphs, used by the CLI.
//!
//! `graph_to_json` renders each object the first time it is reached as
//! `{"$class": name, "$id": n, ...fields}` and every later reach as
//! `{"$ref": n}`, so shared objects and cycles print finitely. Byte buffers
//! render as `{"$data": "<hex>"}`.
//!
//! `graph_from_json` goes the other way for plain JSON documents: objects
//! become `NSDictionary`, arrays become `NSArray`.

use std::collections::HashSet;

use serde_json::{Map, Number};

use crate::object::{FieldWriter, ObjectGraph, ObjectId, Value};
use crate::types::{NsArray, NsDictionary};

/// Render the graph reachable from the root.
pub fn graph_to_json(graph: &ObjectGraph) -> serde_json::Value {
    let mut seen = HashSet::new();
    render(graph, graph.root(), &mut seen)
}

fn render(graph: &ObjectGraph, value: &Value, seen: &mut HashSet<ObjectId>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(r) => Number::from_f64(*r).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Data(d) => {
            let mut map = Map::new();
            map.insert("$data".to_string(), serde_json::Value::String(to_hex(d)));
            serde_json::Value::Object(map)
        }
        Value::Array(items) => serde_json::Value::Array(items.iter().map(|item| render(graph, item, seen)).collect()),
        Value::Object(id) => render_object(graph, *id, seen),
    }
}

fn render_object(graph: &ObjectGraph, id: ObjectId, seen: &mut HashSet<ObjectId>) -> serde_json::Value {
    let mut map = Map::new();
    if !seen.insert(id) {
        map.insert("$ref".to_string(), serde_json::Value::from(id.index()));
        return serde_json::Value::Object(map);
    }
    let Some(object) = graph.get(id) else {
        map.insert("$missing".to_string(), serde_json::Value::from(id.index()));
        return serde_json::Value::Object(map);
    };
    map.insert("$class".to_string(), serde_json::Value::String(object.class_name().to_string()));
    map.insert("$id".to_string(), serde_json::Value::from(id.index()));

    let mut fields = FieldWriter::default();
    if object.encode_fields(&mut fields).is_err() {
        map.insert("$opaque".to_string(), serde_json::Value::Bool(true));
        return serde_json::Value::Object(map);
    }
    for (key, value) in fields.iter() {
        map.insert(key.to_string(), render(graph, value, seen));
    }
    serde_json::Value::Object(map)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build a graph from a plain JSON document.
///
/// Integers outside the `i64` range become reals.
pub fn graph_from_json(json: &serde_json::Value) -> ObjectGraph {
    let mut graph = ObjectGraph::new();
    let root = build(&mut graph, json);
    graph.set_root(root);
    graph
}

fn build(graph: &mut ObjectGraph, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            let items = items.iter().map(|item| build(graph, item)).collect();
            Value::Object(graph.insert(NsArray::new(items)))
        }
        serde_json::Value::Object(map) => {
            let mut dict = NsDictionary::new();
            for (key, value) in map {
                let value = build(graph, value);
                dict.insert(key.as_str(), value);
            }
            Value::Object(graph.insert(dict))
        }
    }
}
