//! Records: local representations of remote, schema-less objects.
//!
//! A [`Record`] keeps the last known field values together with the
//! operations applied locally since the last successful save. Only the
//! pending operations are sent on save, so concurrent edits made elsewhere
//! to other fields are never clobbered.

use crate::error::Result;
use crate::reconcile::ServerState;
use crate::relation::RelationHandle;
use crate::{
    encode, Error, FieldOperation, FileRef, GeoPoint, Number, Synchronizer, Value,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Field names owned by the server.
pub const RESERVED_KEYS: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// Whether `key` is written only by the server.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key may not be empty".into()));
    }
    if is_reserved_key(key) {
        return Err(Error::InvalidArgument(format!(
            "'{key}' is a reserved key and is set by the server"
        )));
    }
    Ok(())
}

fn validate_value(value: &Value) -> Result<()> {
    match value {
        Value::Object(record) if record.is_dirty() => Err(Error::InvalidArgument(format!(
            "nested {} object has unsaved changes; save it first",
            record.class_name()
        ))),
        Value::File(file) if !file.is_uploaded() => Err(Error::InvalidArgument(format!(
            "file '{}' must be uploaded before it can be stored",
            file.name
        ))),
        Value::Relation(relation) => relation
            .added()
            .iter()
            .chain(relation.removed())
            .try_for_each(crate::relation::require_saved),
        Value::Array(items) => items.iter().try_for_each(validate_value),
        Value::Map(map) => map.values().try_for_each(validate_value),
        _ => Ok(()),
    }
}

/// A lightweight reference to a record, used for relation membership and
/// query constraints.
///
/// Two references denote the same object when both carry an object id and
/// the ids match, otherwise when their local identities match.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub class_name: String,
    pub object_id: Option<String>,
    pub local_id: String,
}

impl ObjectRef {
    /// Reference to an object known only by class and id.
    pub fn saved(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: Some(object_id.into()),
            local_id: new_local_id(),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        if self.class_name != other.class_name {
            return false;
        }
        match (&self.object_id, &other.object_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.local_id == other.local_id,
        }
    }
}

impl From<&Record> for ObjectRef {
    fn from(record: &Record) -> Self {
        record.to_ref()
    }
}

impl From<&mut Record> for ObjectRef {
    fn from(record: &mut Record) -> Self {
        record.to_ref()
    }
}

fn new_local_id() -> String {
    format!("local_{}", uuid::Uuid::new_v4().simple())
}

/// A local representation of a remote object.
///
/// Clones share the original's local identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class_name: String,
    endpoint: String,
    object_id: Option<String>,
    local_id: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    fields: BTreeMap<String, Value>,
    pending: BTreeMap<String, FieldOperation>,
}

impl Record {
    /// Create a new, never-saved record of `class_name`.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            endpoint: format!("classes/{class_name}"),
            class_name,
            object_id: None,
            local_id: new_local_id(),
            created_at: None,
            updated_at: None,
            fields: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// A clean reference to an existing object; call `fetch` to load data.
    pub fn without_data(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        let mut record = Self::new(class_name);
        record.object_id = Some(object_id.into());
        record
    }

    /// Override the REST path used for this record's class.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// REST path for the class, relative to the API root.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// REST path for this object, once it has an id.
    pub fn object_path(&self) -> Option<String> {
        self.object_id
            .as_ref()
            .map(|id| format!("{}/{id}", self.endpoint))
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Identity of this in-memory object, stable across saves and deletes.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn created_at(&self) -> Option<&DateTime<Utc>> {
        self.created_at.as_ref()
    }

    pub fn updated_at(&self) -> Option<&DateTime<Utc>> {
        self.updated_at.as_ref()
    }

    /// True while there are operations the server has not confirmed.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_dirty_key(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_operations(&self) -> &BTreeMap<String, FieldOperation> {
        &self.pending
    }

    pub fn is_data_available(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Same class and same server id.
    pub fn has_same_id(&self, other: &Record) -> bool {
        self.class_name == other.class_name
            && self.object_id.is_some()
            && self.object_id == other.object_id
    }

    pub fn to_ref(&self) -> ObjectRef {
        ObjectRef {
            class_name: self.class_name.clone(),
            object_id: self.object_id.clone(),
            local_id: self.local_id.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Set a field.
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        validate_key(key)?;
        let value = value.into();
        if value.is_null() {
            return Err(Error::InvalidArgument(format!(
                "value for '{key}' may not be null; use remove instead"
            )));
        }
        validate_value(&value)?;
        self.perform_operation(key, FieldOperation::Set(value))
    }

    /// Remove a field.
    ///
    /// On a saved record this queues a delete for the server. On an unsaved
    /// record the field and its pending operation are simply dropped.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        if self.object_id.is_some() {
            self.perform_operation(key, FieldOperation::Delete)
        } else {
            self.fields.remove(key);
            self.pending.remove(key);
            Ok(())
        }
    }

    pub fn increment(&mut self, key: &str) -> Result<()> {
        self.increment_by(key, 1i32)
    }

    pub fn decrement(&mut self, key: &str) -> Result<()> {
        self.increment_by(key, -1i32)
    }

    /// Atomically add `amount` on the server; the local value is updated
    /// optimistically.
    pub fn increment_by(&mut self, key: &str, amount: impl Into<Number>) -> Result<()> {
        validate_key(key)?;
        self.perform_operation(key, FieldOperation::Increment(amount.into()))
            .map_err(|e| match e {
                Error::InvalidOperation(msg) => Error::InvalidArgument(msg),
                other => other,
            })
    }

    pub fn add_to_array(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.add_all_to_array(key, [value.into()])
    }

    pub fn add_all_to_array(
        &mut self,
        key: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        let values = self.array_values(key, values)?;
        self.perform_operation(key, FieldOperation::Add(values))
    }

    pub fn add_unique_to_array(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.add_all_unique_to_array(key, [value.into()])
    }

    pub fn add_all_unique_to_array(
        &mut self,
        key: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        let values = self.array_values(key, values)?;
        self.perform_operation(key, FieldOperation::AddUnique(values))
    }

    pub fn remove_from_array(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.remove_all_from_array(key, [value.into()])
    }

    pub fn remove_all_from_array(
        &mut self,
        key: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        let values = self.array_values(key, values)?;
        self.perform_operation(key, FieldOperation::Remove(values))
    }

    fn array_values(
        &self,
        key: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        validate_key(key)?;
        let values: Vec<Value> = values.into_iter().collect();
        values.iter().try_for_each(validate_value)?;
        Ok(values)
    }

    /// The relation stored under `key`, created if absent.
    pub fn relation(&mut self, key: &str) -> Result<RelationHandle<'_>> {
        validate_key(key)?;
        match self.fields.get_mut(key) {
            Some(Value::Relation(relation)) => relation.attach(&self.local_id, key)?,
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "field '{key}' holds a {} value, not a relation",
                    other.kind_name()
                )))
            }
            None => {
                let mut relation = crate::Relation::default();
                relation.attach(&self.local_id, key)?;
                self.fields.insert(key.to_string(), Value::Relation(relation));
            }
        }
        Ok(RelationHandle::new(self, key.to_string()))
    }

    /// Apply `op` to the cached value and record it as pending.
    pub(crate) fn perform_operation(&mut self, key: &str, op: FieldOperation) -> Result<()> {
        let updated = op.apply(self.fields.get(key))?;
        let merged = op.merge_with_previous(self.pending.get(key));
        match updated {
            Some(value) => self.fields.insert(key.to_string(), value),
            None => self.fields.remove(key),
        };
        self.pending.insert(key.to_string(), merged);
        Ok(())
    }

    pub(crate) fn set_field(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Encode the pending operations as a request body.
    pub fn pending_payload(&self) -> Result<Map<String, JsonValue>> {
        let mut payload = Map::new();
        for (key, op) in &self.pending {
            payload.insert(key.clone(), op.encode()?);
        }
        Ok(payload)
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Merge a confirmed server state and clear pending operations.
    ///
    /// With `replace_fields` the server's fields replace the cached ones
    /// wholesale (fetch); otherwise they are merged in (save echo).
    pub(crate) fn absorb(&mut self, state: ServerState, replace_fields: bool) {
        if let Some(id) = state.object_id {
            self.object_id = Some(id);
        }
        if state.created_at.is_some() {
            self.created_at = state.created_at;
        }
        if state.updated_at.is_some() {
            self.updated_at = state.updated_at;
        }
        if replace_fields {
            self.fields = state.fields;
        } else {
            self.fields.extend(state.fields);
        }
        if self.updated_at.is_none() {
            self.updated_at = self.created_at;
        }
        self.pending.clear();
    }

    /// Back to the never-saved state. Local identity is kept.
    pub(crate) fn reset(&mut self) {
        self.object_id = None;
        self.created_at = None;
        self.updated_at = None;
        self.fields.clear();
        self.pending.clear();
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Shorthand for [`Synchronizer::save`].
    pub fn save(&mut self, sync: &Synchronizer) -> Result<()> {
        sync.save(self)
    }

    /// Shorthand for [`Synchronizer::delete`].
    pub fn delete(&mut self, sync: &Synchronizer) -> Result<()> {
        sync.delete(self)
    }

    /// Shorthand for [`Synchronizer::fetch`].
    pub fn fetch(&mut self, sync: &Synchronizer) -> Result<()> {
        sync.fetch(self)
    }

    /// Shorthand for [`Synchronizer::fetch_if_needed`].
    pub fn fetch_if_needed(&mut self, sync: &Synchronizer) -> Result<()> {
        sync.fetch_if_needed(self)
    }

    // ------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Option<T> {
        let value = self.fields.get(key)?;
        let out = extract(value);
        if out.is_none() {
            tracing::warn!(
                class = %self.class_name,
                key,
                expected,
                found = value.kind_name(),
                "field has unexpected type"
            );
        }
        out
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.typed(key, "string", Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.typed(key, "boolean", Value::as_bool)
    }

    pub fn get_number(&self, key: &str) -> Option<Number> {
        self.typed(key, "number", Value::as_number)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_number(key).map(Number::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get_number(key).map(Number::as_f64)
    }

    pub fn get_date(&self, key: &str) -> Option<&DateTime<Utc>> {
        self.typed(key, "date", |value| match value {
            Value::Date(date) => Some(date),
            _ => None,
        })
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.typed(key, "bytes", |value| match value {
            Value::Bytes(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    pub fn get_array(&self, key: &str) -> Option<&[Value]> {
        self.typed(key, "array", Value::as_array)
    }

    pub fn get_map(&self, key: &str) -> Option<&BTreeMap<String, Value>> {
        self.typed(key, "map", |value| match value {
            Value::Map(map) => Some(map),
            _ => None,
        })
    }

    pub fn get_object(&self, key: &str) -> Option<&Record> {
        self.typed(key, "object", Value::as_object)
    }

    pub fn get_geo_point(&self, key: &str) -> Option<GeoPoint> {
        self.typed(key, "geo point", |value| match value {
            Value::GeoPoint(point) => Some(*point),
            _ => None,
        })
    }

    pub fn get_file(&self, key: &str) -> Option<&FileRef> {
        self.typed(key, "file", |value| match value {
            Value::File(file) => Some(file),
            _ => None,
        })
    }

    /// Encode the fields (not the pending operations) for display or
    /// debugging. Nested records become pointers.
    pub fn to_json(&self) -> Result<JsonValue> {
        let mut out = encode::encode_attributes(self);
        for (key, value) in &self.fields {
            out.insert(key.clone(), encode::encode(value, encode::ObjectEncoding::Pointer)?);
        }
        Ok(JsonValue::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn saved(class: &str, id: &str) -> Record {
        Record::without_data(class, id)
    }

    // ========================================================================
    // Keys and values
    // ========================================================================

    #[test]
    fn reserved_keys_are_rejected() {
        let mut record = Record::new("Post");
        for key in RESERVED_KEYS {
            assert!(matches!(
                record.put(key, "x"),
                Err(Error::InvalidArgument(_))
            ));
            assert!(record.increment(key).is_err());
            assert!(record.remove(key).is_err());
        }
        assert!(!record.is_dirty());
    }

    #[test]
    fn empty_key_and_null_are_rejected() {
        let mut record = Record::new("Post");
        assert!(record.put("", "x").is_err());
        assert!(record.put("title", Value::Null).is_err());
        assert!(!record.is_dirty());
    }

    #[test]
    fn dirty_nested_record_is_rejected() {
        let mut author = Record::new("Author");
        author.put("name", "Ann").unwrap();
        let mut post = Record::new("Post");
        assert!(post.put("author", &author).is_err());
        assert!(post.put("authors", Value::array([&author])).is_err());
    }

    #[test]
    fn unsaved_file_is_rejected() {
        let mut post = Record::new("Post");
        assert!(post.put("cover", FileRef::pending("a.png")).is_err());
        post.put("cover", FileRef::uploaded("a.png", "http://files/a.png"))
            .unwrap();
    }

    #[test]
    fn relation_with_unsaved_member_is_rejected() {
        let unsaved = crate::Relation::decoded(
            Some("Tag".into()),
            vec![ObjectRef::saved("Tag", "t1"), ObjectRef::from(&Record::new("Tag"))],
        );
        let mut post = Record::new("Post");
        assert!(matches!(
            post.put("tags", Value::Relation(unsaved)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(!post.has("tags"));
        assert!(!post.is_dirty());

        let members = vec![ObjectRef::saved("Tag", "t1")];
        let relation = crate::Relation::decoded(Some("Tag".into()), members);
        post.put("tags", Value::Relation(relation)).unwrap();
    }

    #[test]
    fn put_marks_dirty_and_caches_value() {
        let mut post = Record::new("Post");
        post.put("title", "hello").unwrap();
        assert!(post.is_dirty());
        assert!(post.is_dirty_key("title"));
        assert_eq!(post.get_str("title"), Some("hello"));
        assert_eq!(post.pending_payload().unwrap()["title"], json!("hello"));
    }

    #[test]
    fn remove_on_unsaved_drops_pending_op() {
        let mut post = Record::new("Post");
        post.put("title", "hello").unwrap();
        post.remove("title").unwrap();
        assert!(!post.is_dirty());
        assert!(!post.has("title"));
    }

    #[test]
    fn remove_on_saved_queues_delete() {
        let mut post = saved("Post", "p1");
        post.remove("title").unwrap();
        assert_eq!(
            post.pending_payload().unwrap()["title"],
            json!({"__op": "Delete"})
        );
    }

    // ========================================================================
    // Numbers and arrays
    // ========================================================================

    #[test]
    fn increment_then_decrement() {
        let mut post = Record::new("Post");
        post.put("views", 1i32).unwrap();
        post.increment_by("views", 5i32).unwrap();
        post.increment_by("views", -2i32).unwrap();
        assert_eq!(post.get_i64("views"), Some(4));
        assert_eq!(post.pending_payload().unwrap()["views"], json!(4));
    }

    #[test]
    fn increments_on_saved_record_accumulate() {
        let mut post = saved("Post", "p1");
        post.increment("views").unwrap();
        post.increment("views").unwrap();
        post.decrement("views").unwrap();
        assert_eq!(
            post.pending_payload().unwrap()["views"],
            json!({"__op": "Increment", "amount": 1})
        );
    }

    #[test]
    fn increment_non_number_is_invalid_argument() {
        let mut post = Record::new("Post");
        post.put("title", "hello").unwrap();
        assert!(matches!(
            post.increment("title"),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(post.get_str("title"), Some("hello"));
    }

    #[test]
    fn array_ops_are_recorded_not_applied() {
        let mut post = saved("Post", "p1");
        post.add_to_array("tags", "a").unwrap();
        post.add_to_array("tags", "b").unwrap();
        assert!(!post.has("tags"));
        assert_eq!(
            post.pending_payload().unwrap()["tags"],
            json!({"__op": "Add", "objects": ["a", "b"]})
        );

        post.remove_from_array("tags", "a").unwrap();
        assert_eq!(
            post.pending_payload().unwrap()["tags"],
            json!({"__op": "Remove", "objects": ["a"]})
        );
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    #[test]
    fn absorb_clears_pending_and_defaults_updated_at() {
        let mut post = Record::new("Post");
        post.put("title", "hello").unwrap();
        let created = crate::encode::parse_date("2024-01-01T00:00:00.000Z").unwrap();
        post.absorb(
            ServerState {
                object_id: Some("p1".into()),
                created_at: Some(created),
                ..ServerState::default()
            },
            false,
        );
        assert!(!post.is_dirty());
        assert_eq!(post.object_id(), Some("p1"));
        assert_eq!(post.updated_at(), Some(&created));
        assert_eq!(post.get_str("title"), Some("hello"));
    }

    #[test]
    fn reset_keeps_local_identity() {
        let mut post = saved("Post", "p1");
        let local = post.local_id().to_string();
        post.put("title", "x").unwrap();
        post.reset();
        assert_eq!(post.object_id(), None);
        assert!(!post.is_dirty());
        assert!(!post.is_data_available());
        assert_eq!(post.local_id(), local);
    }

    // ========================================================================
    // Identity and access
    // ========================================================================

    #[test]
    fn object_refs_compare_by_id_then_identity() {
        let a = saved("Tag", "t1");
        let b = saved("Tag", "t1");
        assert_eq!(a.to_ref(), b.to_ref());
        assert!(a.has_same_id(&b));

        let c = Record::new("Tag");
        let d = Record::new("Tag");
        assert_ne!(c.to_ref(), d.to_ref());
        assert_eq!(c.to_ref(), c.clone().to_ref());
    }

    #[test]
    fn typed_getters_return_none_on_mismatch() {
        let mut post = Record::new("Post");
        post.put("title", "hello").unwrap();
        post.put("score", 2.5f64).unwrap();
        assert_eq!(post.get_bool("title"), None);
        assert_eq!(post.get_f64("score"), Some(2.5));
        assert_eq!(post.get_i64("score"), Some(2));
        assert_eq!(post.get_str("missing"), None);
    }

    #[test]
    fn endpoints() {
        let post = saved("Post", "p1");
        assert_eq!(post.endpoint(), "classes/Post");
        assert_eq!(post.object_path().as_deref(), Some("classes/Post/p1"));
        let user = Record::new("_User").with_endpoint("users");
        assert_eq!(user.object_path(), None);
        assert_eq!(user.endpoint(), "users");
    }
}
