//! Conversion between [`Value`] and the backend's JSON wire format.
//!
//! Typed values travel as objects tagged with `__type`:
//!
//! | Kind      | Wire form                                              |
//! |-----------|--------------------------------------------------------|
//! | Date      | `{"__type":"Date","iso":"2024-01-31T12:00:00.000Z"}`   |
//! | Bytes     | `{"__type":"Bytes","base64":"..."}`                    |
//! | GeoPoint  | `{"__type":"GeoPoint","latitude":..,"longitude":..}`   |
//! | File      | `{"__type":"File","name":"..","url":".."}`             |
//! | Pointer   | `{"__type":"Pointer","className":"..","objectId":".."}`|
//! | Object    | `{"__type":"Object","className":"..",...fields}`       |
//! | Relation  | `{"__type":"Relation","className":"..","objects":[..]}`|

use crate::error::Result;
use crate::reconcile::ServerState;
use crate::{Error, FileRef, GeoPoint, Number, ObjectRef, Record, Registry, Relation, Value};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

/// How nested records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEncoding {
    /// As `Pointer` references. Used for everything sent to the server.
    Pointer,
    /// As complete embedded `Object`s. Used for local snapshots.
    Full,
}

/// Encode a value to its wire form.
pub fn encode(value: &Value, strategy: ObjectEncoding) -> Result<JsonValue> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Number(n) => encode_number(*n),
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        Value::Date(date) => Ok(json!({"__type": "Date", "iso": format_date(date)})),
        Value::Bytes(data) => Ok(json!({"__type": "Bytes", "base64": STANDARD.encode(data)})),
        Value::GeoPoint(point) => Ok(json!({
            "__type": "GeoPoint",
            "latitude": point.latitude,
            "longitude": point.longitude,
        })),
        Value::File(file) => encode_file(file),
        Value::Object(record) => match strategy {
            ObjectEncoding::Pointer => encode_nested_pointer(record),
            ObjectEncoding::Full => encode_record_full(record),
        },
        Value::Relation(relation) => relation.encode(),
        Value::Array(items) => items
            .iter()
            .map(|item| encode(item, strategy))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        Value::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), encode(item, strategy)?);
            }
            Ok(JsonValue::Object(out))
        }
    }
}

pub(crate) fn encode_number(number: Number) -> Result<JsonValue> {
    number
        .to_json()
        .map(JsonValue::Number)
        .ok_or_else(|| Error::EncodingFailure(format!("{number} is not a finite number")))
}

fn encode_file(file: &FileRef) -> Result<JsonValue> {
    match &file.url {
        Some(url) => Ok(json!({"__type": "File", "name": file.name, "url": url})),
        None => Err(Error::EncodingFailure(format!(
            "file '{}' must be uploaded before it can be referenced",
            file.name
        ))),
    }
}

fn encode_nested_pointer(record: &Record) -> Result<JsonValue> {
    if record.is_dirty() {
        return Err(Error::EncodingFailure(format!(
            "nested {} object has unsaved changes",
            record.class_name()
        )));
    }
    encode_pointer(&record.to_ref())
}

/// Encode a reference as a `Pointer`. The referenced object must be saved.
pub fn encode_pointer(object: &ObjectRef) -> Result<JsonValue> {
    match &object.object_id {
        Some(id) => Ok(json!({
            "__type": "Pointer",
            "className": object.class_name,
            "objectId": id,
        })),
        None => Err(Error::EncodingFailure(format!(
            "unable to encode an unsaved {} object",
            object.class_name
        ))),
    }
}

/// Encode a clean record as an embedded `Object`, nested records included.
pub fn encode_record_full(record: &Record) -> Result<JsonValue> {
    if record.is_dirty() {
        return Err(Error::EncodingFailure(format!(
            "a dirty {} object cannot be embedded",
            record.class_name()
        )));
    }
    let mut out = Map::new();
    out.insert("__type".into(), json!("Object"));
    out.insert("className".into(), json!(record.class_name()));
    out.extend(encode_attributes(record));
    for (key, value) in record.fields() {
        out.insert(key.clone(), encode(value, ObjectEncoding::Full)?);
    }
    Ok(JsonValue::Object(out))
}

/// The reserved attributes (`objectId`, `createdAt`, `updatedAt`) that are set.
pub(crate) fn encode_attributes(record: &Record) -> Map<String, JsonValue> {
    let mut out = Map::new();
    if let Some(id) = record.object_id() {
        out.insert("objectId".into(), json!(id));
    }
    if let Some(created) = record.created_at() {
        out.insert("createdAt".into(), json!(format_date(created)));
    }
    if let Some(updated) = record.updated_at() {
        out.insert("updatedAt".into(), json!(format_date(updated)));
    }
    out
}

/// Format a date the way the backend does: UTC with millisecond precision.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 date string.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| Error::InvalidJson(format!("invalid date '{text}': {e}")))
}

/// Parse a date given either as a bare string or as a `Date` object.
pub fn decode_date(json: &JsonValue) -> Result<DateTime<Utc>> {
    match json {
        JsonValue::String(text) => parse_date(text),
        JsonValue::Object(map) => match map.get("iso").and_then(JsonValue::as_str) {
            Some(text) => parse_date(text),
            None => Err(malformed("Date")),
        },
        _ => Err(malformed("Date")),
    }
}

/// Decode a wire value. Pointers and embedded objects are built through
/// `registry` so registered classes get their own endpoints.
pub fn decode(json: &JsonValue, registry: &Registry) -> Result<Value> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => Ok(Value::Number(Number::from_json(n))),
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| decode(item, registry))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        JsonValue::Object(map) => match map.get("__type").and_then(JsonValue::as_str) {
            Some(kind) => decode_typed(kind, map, registry),
            None => decode_map(map, registry),
        },
    }
}

fn decode_map(map: &Map<String, JsonValue>, registry: &Registry) -> Result<Value> {
    let mut out = BTreeMap::new();
    for (key, item) in map {
        out.insert(key.clone(), decode(item, registry)?);
    }
    Ok(Value::Map(out))
}

fn decode_typed(kind: &str, map: &Map<String, JsonValue>, registry: &Registry) -> Result<Value> {
    let text = |field: &str| map.get(field).and_then(JsonValue::as_str);
    match kind {
        "Date" => decode_date(&JsonValue::Object(map.clone())).map(Value::Date),
        "Bytes" => {
            let encoded = text("base64").ok_or_else(|| malformed(kind))?;
            STANDARD
                .decode(encoded)
                .map(Value::Bytes)
                .map_err(|e| Error::InvalidJson(format!("invalid base64 payload: {e}")))
        }
        "GeoPoint" => {
            let coordinate = |field: &str| map.get(field).and_then(JsonValue::as_f64);
            match (coordinate("latitude"), coordinate("longitude")) {
                (Some(lat), Some(lng)) => Ok(Value::GeoPoint(GeoPoint::new(lat, lng))),
                _ => Err(malformed(kind)),
            }
        }
        "File" => {
            let name = text("name").ok_or_else(|| malformed(kind))?;
            Ok(Value::File(FileRef {
                name: name.to_string(),
                url: text("url").map(str::to_string),
            }))
        }
        "Pointer" => match (text("className"), text("objectId")) {
            (Some(class_name), Some(id)) => Ok(Value::Object(Box::new(
                registry.create_without_data(class_name, id),
            ))),
            _ => Err(malformed(kind)),
        },
        "Object" => {
            let class_name = text("className").ok_or_else(|| malformed(kind))?;
            let mut attributes = map.clone();
            attributes.remove("__type");
            attributes.remove("className");
            let state = ServerState::parse(&attributes, registry)?;
            let mut record = registry.create(class_name);
            record.absorb(state, true);
            Ok(Value::Object(Box::new(record)))
        }
        "Relation" => {
            let target = text("className").map(str::to_string);
            let mut members = Vec::new();
            if let Some(JsonValue::Array(objects)) = map.get("objects") {
                for object in objects {
                    match decode(object, registry)? {
                        Value::Object(record) => members.push(record.to_ref()),
                        _ => return Err(malformed(kind)),
                    }
                }
            }
            Ok(Value::Relation(Relation::decoded(target, members)))
        }
        _ => decode_map(map, registry),
    }
}

fn malformed(kind: &str) -> Error {
    Error::InvalidJson(format!("malformed {kind} value"))
}
