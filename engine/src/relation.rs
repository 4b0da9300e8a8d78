//! Many-to-many relations stored on a record field.
//!
//! A [`Relation`] value lives in its parent record's fields. Edits go through
//! a [`RelationHandle`], obtained with [`Record::relation`], which borrows the
//! parent mutably and turns every add/remove into a pending
//! [`FieldOperation::Relation`] on it.

use crate::encode::encode_pointer;
use crate::error::Result;
use crate::{Error, FieldOperation, ObjectRef, Query, Record, RelationChange, Value};
use serde_json::{Map, Value as JsonValue};

/// The parent record (by local identity) and field a relation belongs to.
#[derive(Debug, Clone, PartialEq)]
struct Owner {
    local_id: String,
    key: String,
}

/// Set of related objects of a single target class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    owner: Option<Owner>,
    target_class: Option<String>,
    added: Vec<ObjectRef>,
    removed: Vec<ObjectRef>,
}

impl Relation {
    /// A detached relation to objects of `target_class`.
    pub fn new(target_class: impl Into<String>) -> Self {
        Self {
            target_class: Some(target_class.into()),
            ..Self::default()
        }
    }

    pub(crate) fn decoded(target_class: Option<String>, members: Vec<ObjectRef>) -> Self {
        Self {
            target_class,
            added: members,
            ..Self::default()
        }
    }

    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    /// Objects added since the relation was loaded or created.
    pub fn added(&self) -> &[ObjectRef] {
        &self.added
    }

    /// Objects removed since the relation was loaded or created.
    pub fn removed(&self) -> &[ObjectRef] {
        &self.removed
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.added.contains(object)
    }

    /// Whether the relation is bound to a parent record and field.
    pub fn is_attached(&self) -> bool {
        self.owner.is_some()
    }

    /// Adopt `class` as the target class, or check it matches the one set.
    pub(crate) fn ensure_target_class(&mut self, class: &str) -> Result<()> {
        match &self.target_class {
            Some(existing) if existing != class => Err(Error::IllegalState(format!(
                "related object must be of class {existing}, but {class} was passed in"
            ))),
            Some(_) => Ok(()),
            None => {
                self.target_class = Some(class.to_string());
                Ok(())
            }
        }
    }

    /// Bind to a parent record and field, or check it is already bound there.
    pub(crate) fn attach(&mut self, parent_local_id: &str, key: &str) -> Result<()> {
        match &self.owner {
            None => {
                self.owner = Some(Owner {
                    local_id: parent_local_id.to_string(),
                    key: key.to_string(),
                });
                Ok(())
            }
            Some(owner) if owner.local_id != parent_local_id => Err(Error::IllegalState(
                "one relation cannot belong to two different objects".into(),
            )),
            Some(owner) if owner.key != key => Err(Error::IllegalState(format!(
                "one relation cannot be used for two keys ('{}' and '{key}')",
                owner.key
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Full value encoding. Only saved members of the added set are listed.
    pub fn encode(&self) -> Result<JsonValue> {
        let mut out = Map::new();
        out.insert("__type".into(), "Relation".into());
        if let Some(target) = &self.target_class {
            out.insert("className".into(), target.clone().into());
        }
        let objects = self
            .added
            .iter()
            .filter(|member| member.object_id.is_some())
            .map(encode_pointer)
            .collect::<Result<Vec<_>>>()?;
        out.insert("objects".into(), JsonValue::Array(objects));
        Ok(JsonValue::Object(out))
    }
}

/// Relation members are sent as pointers, so each needs an object id.
pub(crate) fn require_saved(member: &ObjectRef) -> Result<()> {
    if member.object_id.is_none() {
        return Err(Error::InvalidArgument(format!(
            "all objects in a relation must have an objectId; save the {} object first",
            member.class_name
        )));
    }
    Ok(())
}

/// Mutable access to the relation stored under one field of a record.
#[derive(Debug)]
pub struct RelationHandle<'a> {
    record: &'a mut Record,
    key: String,
}

impl<'a> RelationHandle<'a> {
    pub(crate) fn new(record: &'a mut Record, key: String) -> Self {
        Self { record, key }
    }

    fn current(&self) -> Option<&Relation> {
        match self.record.get(&self.key) {
            Some(Value::Relation(relation)) => Some(relation),
            _ => None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target_class(&self) -> Option<&str> {
        self.current().and_then(Relation::target_class)
    }

    pub fn added(&self) -> &[ObjectRef] {
        self.current().map(Relation::added).unwrap_or_default()
    }

    pub fn removed(&self) -> &[ObjectRef] {
        self.current().map(Relation::removed).unwrap_or_default()
    }

    /// Fix the target class before any object is added.
    pub fn set_target_class(&mut self, class: &str) -> Result<()> {
        let mut relation = self.current().cloned().unwrap_or_default();
        relation.ensure_target_class(class)?;
        self.record.set_field(&self.key, Value::Relation(relation));
        Ok(())
    }

    /// Add an object. Adding an object already in the added set is a no-op.
    pub fn add(&mut self, object: impl Into<ObjectRef>) -> Result<()> {
        let object = object.into();
        require_saved(&object)?;
        let mut relation = self.current().cloned().unwrap_or_default();
        if relation.added.contains(&object) {
            return Ok(());
        }
        relation.ensure_target_class(&object.class_name)?;
        let change = RelationChange::new(
            object.class_name.clone(),
            relation.added.iter().cloned().chain([object.clone()]),
            Vec::new(),
        )?;

        relation.removed.retain(|member| member != &object);
        relation.added.push(object);
        self.commit(relation, change)
    }

    /// Remove an object. Removing an object already in the removed set is a no-op.
    pub fn remove(&mut self, object: impl Into<ObjectRef>) -> Result<()> {
        let object = object.into();
        require_saved(&object)?;
        let mut relation = self.current().cloned().unwrap_or_default();
        if relation.removed.contains(&object) {
            return Ok(());
        }
        relation.ensure_target_class(&object.class_name)?;
        let change = RelationChange::new(
            object.class_name.clone(),
            Vec::new(),
            relation.removed.iter().cloned().chain([object.clone()]),
        )?;

        relation.added.retain(|member| member != &object);
        relation.removed.push(object);
        self.commit(relation, change)
    }

    fn commit(&mut self, relation: Relation, change: RelationChange) -> Result<()> {
        self.record.set_field(&self.key, Value::Relation(relation));
        self.record
            .perform_operation(&self.key, FieldOperation::Relation(change))
    }

    /// Query for the objects in this relation.
    ///
    /// When the target class is not known yet the query targets the parent
    /// class and asks the server to redirect to the relation's class.
    pub fn query(&self) -> Query {
        let parent = self.record.to_ref();
        match self.target_class() {
            Some(target) => Query::new(target).where_related_to(parent, &self.key),
            None => Query::new(self.record.class_name())
                .redirect_class_name_for_key(&self.key)
                .where_related_to(parent, &self.key),
        }
    }
}
