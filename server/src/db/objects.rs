//! In-memory object storage.
//!
//! Objects are kept in their wire encoding, keyed by `(className, objectId)`.
//! Relation memberships live beside them, keyed by the owning object and the
//! relation field.

use super::ops::{apply_body, RelationEdit};
use super::query::{self, Filter};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nimbus_engine::encode::format_date;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

type ObjectKey = (String, String);
type RelationKey = (String, String, String);

/// A stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub class_name: String,
    pub object_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl StoredObject {
    /// Response form: fields plus `objectId`, `createdAt` and `updatedAt`.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = self.fields.clone();
        map.insert("objectId".into(), Value::String(self.object_id.clone()));
        map.insert("createdAt".into(), Value::String(format_date(&self.created_at)));
        map.insert("updatedAt".into(), Value::String(format_date(&self.updated_at)));
        map
    }
}

/// Outcome of a write: the stored object and the computed values to echo.
#[derive(Debug)]
pub struct WriteResult {
    pub object: StoredObject,
    pub echo: Map<String, Value>,
}

/// Parameters of a class listing.
#[derive(Debug, Default)]
pub struct FindOptions {
    pub filter: Filter,
    pub order: Option<String>,
    pub skip: usize,
    pub limit: usize,
}

/// Thread-safe object store. Shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: DashMap<ObjectKey, StoredObject>,
    relations: DashMap<RelationKey, BTreeSet<String>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Create an object from a request body.
    pub fn create(&self, class_name: &str, body: &Map<String, Value>) -> Result<WriteResult> {
        let applied = apply_body(&Map::new(), body)?;
        let object_id = new_object_id();
        let now = Utc::now();

        self.apply_relation_edits(class_name, &object_id, &applied.relation_edits);
        let object = StoredObject {
            class_name: class_name.to_string(),
            object_id: object_id.clone(),
            created_at: now,
            updated_at: now,
            fields: applied.fields,
        };
        self.objects
            .insert((class_name.to_string(), object_id), object.clone());

        tracing::debug!(class = %class_name, object_id = %object.object_id, "Created object");
        Ok(WriteResult {
            object,
            echo: applied.echo,
        })
    }

    /// Apply a request body to an existing object.
    pub fn update(
        &self,
        class_name: &str,
        object_id: &str,
        body: &Map<String, Value>,
    ) -> Result<WriteResult> {
        let key = (class_name.to_string(), object_id.to_string());
        let mut entry = self.objects.get_mut(&key).ok_or_else(not_found)?;

        let applied = apply_body(&entry.fields, body)?;
        self.apply_relation_edits(class_name, object_id, &applied.relation_edits);
        entry.fields = applied.fields;
        entry.updated_at = Utc::now().max(entry.created_at);

        tracing::debug!(class = %class_name, object_id = %object_id, "Updated object");
        Ok(WriteResult {
            object: entry.value().clone(),
            echo: applied.echo,
        })
    }

    pub fn get(&self, class_name: &str, object_id: &str) -> Result<StoredObject> {
        self.objects
            .get(&(class_name.to_string(), object_id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(not_found)
    }

    /// Delete an object along with the relations it owns.
    pub fn delete(&self, class_name: &str, object_id: &str) -> Result<()> {
        self.objects
            .remove(&(class_name.to_string(), object_id.to_string()))
            .ok_or_else(not_found)?;
        self.relations
            .retain(|(owner_class, owner_id, _), _| {
                !(owner_class == class_name && owner_id == object_id)
            });
        tracing::debug!(class = %class_name, object_id = %object_id, "Deleted object");
        Ok(())
    }

    /// Object ids reachable through a relation field.
    pub fn relation_members(
        &self,
        class_name: &str,
        object_id: &str,
        key: &str,
    ) -> BTreeSet<String> {
        self.relations
            .get(&(class_name.to_string(), object_id.to_string(), key.to_string()))
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    /// Matching objects in response form, plus the total match count before
    /// `skip` and `limit`.
    pub fn find(
        &self,
        class_name: &str,
        options: &FindOptions,
    ) -> (Vec<Map<String, Value>>, usize) {
        let members = options.filter.related_to().map(|related| {
            self.relation_members(&related.class_name, &related.object_id, &related.key)
        });

        let mut matches: Vec<Map<String, Value>> = self
            .objects
            .iter()
            .filter(|entry| entry.class_name == class_name)
            .filter(|entry| {
                members
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&entry.object_id))
            })
            .map(|entry| entry.to_json())
            .filter(|object| options.filter.matches(object))
            .collect();

        // Stable default order so paging is deterministic.
        query::sort(&mut matches, "createdAt,objectId");
        if let Some(order) = &options.order {
            query::sort(&mut matches, order);
        }

        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(options.skip)
            .take(options.limit)
            .collect();
        (page, total)
    }

    fn apply_relation_edits(&self, class_name: &str, object_id: &str, edits: &[RelationEdit]) {
        for edit in edits {
            let (key, ids, adding) = match edit {
                RelationEdit::Add { key, object_ids } => (key, object_ids, true),
                RelationEdit::Remove { key, object_ids } => (key, object_ids, false),
            };
            let mut members = self
                .relations
                .entry((class_name.to_string(), object_id.to_string(), key.clone()))
                .or_default();
            for id in ids {
                if adding {
                    members.insert(id.clone());
                } else {
                    members.remove(id);
                }
            }
        }
    }
}

fn not_found() -> AppError {
    AppError::ObjectNotFound("Object not found.".into())
}

/// Ten alphanumeric characters, like the ids the hosted backend hands out.
fn new_object_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn create_get_update_delete() {
        let store = ObjectStore::new();
        let created = store.create("Post", &body(json!({"title": "hi"}))).unwrap();
        let id = created.object.object_id.clone();
        assert_eq!(id.len(), 10);

        let updated = store
            .update("Post", &id, &body(json!({"views": {"__op": "Increment", "amount": 2}})))
            .unwrap();
        assert_eq!(updated.echo["views"], json!(2));
        assert!(updated.object.updated_at >= updated.object.created_at);

        let fetched = store.get("Post", &id).unwrap();
        assert_eq!(fetched.fields, body(json!({"title": "hi", "views": 2})));

        store.delete("Post", &id).unwrap();
        assert_eq!(store.get("Post", &id).unwrap_err().code(), 101);
        assert_eq!(store.delete("Post", &id).unwrap_err().code(), 101);
    }

    #[test]
    fn failed_update_changes_nothing() {
        let store = ObjectStore::new();
        let id = store
            .create("Post", &body(json!({"title": "hi"})))
            .unwrap()
            .object
            .object_id;
        let err = store
            .update(
                "Post",
                &id,
                &body(json!({"extra": 1, "title": {"__op": "Increment", "amount": 1}})),
            )
            .unwrap_err();
        assert_eq!(err.code(), 111);
        assert_eq!(store.get("Post", &id).unwrap().fields, body(json!({"title": "hi"})));
    }

    #[test]
    fn relations_are_tracked_per_owner() {
        let store = ObjectStore::new();
        let id = store.create("Post", &Map::new()).unwrap().object.object_id;
        store
            .update(
                "Post",
                &id,
                &body(json!({"tags": {"__op": "AddRelation", "objects": [
                    {"__type": "Pointer", "className": "Tag", "objectId": "t1"},
                    {"__type": "Pointer", "className": "Tag", "objectId": "t2"}
                ]}})),
            )
            .unwrap();
        store
            .update(
                "Post",
                &id,
                &body(json!({"tags": {"__op": "RemoveRelation", "objects": [
                    {"__type": "Pointer", "className": "Tag", "objectId": "t1"}
                ]}})),
            )
            .unwrap();

        let members = store.relation_members("Post", &id, "tags");
        assert_eq!(members.into_iter().collect::<Vec<_>>(), vec!["t2".to_string()]);

        store.delete("Post", &id).unwrap();
        assert!(store.relation_members("Post", &id, "tags").is_empty());
    }

    #[test]
    fn find_filters_orders_and_pages() {
        let store = ObjectStore::new();
        for score in [5, 1, 9, 3] {
            store
                .create("Score", &body(json!({"score": score})))
                .unwrap();
        }
        store.create("Other", &body(json!({"score": 100}))).unwrap();

        let options = FindOptions {
            filter: Filter::parse(Some(r#"{"score":{"$gt":1}}"#)).unwrap(),
            order: Some("-score".into()),
            skip: 1,
            limit: 1,
        };
        let (page, total) = store.find("Score", &options);
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["score"], json!(5));
    }
}
