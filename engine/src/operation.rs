//! Field operations.
//!
//! Record fields are never changed directly on the server. Each local
//! mutation is recorded as a [`FieldOperation`] that knows how to apply itself
//! to the locally cached value and how to encode itself for the wire, so
//! concurrent changes from other clients (increments, array appends,
//! relation edits) compose on the server instead of overwriting each other.

use crate::encode::{encode, encode_number, encode_pointer, ObjectEncoding};
use crate::error::Result;
use crate::{Error, Number, ObjectRef, Relation, Value};
use serde_json::{json, Value as JsonValue};

/// Pending relation edits for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationChange {
    target_class: String,
    added: Vec<ObjectRef>,
    removed: Vec<ObjectRef>,
}

impl RelationChange {
    /// Build a change. Every member must belong to `target_class`.
    pub fn new(
        target_class: impl Into<String>,
        added: impl IntoIterator<Item = ObjectRef>,
        removed: impl IntoIterator<Item = ObjectRef>,
    ) -> Result<Self> {
        let target_class = target_class.into();
        let added = dedup(added);
        let removed = dedup(removed);
        if let Some(stray) = added
            .iter()
            .chain(removed.iter())
            .find(|member| member.class_name != target_class)
        {
            return Err(Error::IllegalState(format!(
                "related object must be of class {target_class}, but {} was passed in",
                stray.class_name
            )));
        }
        Ok(Self {
            target_class,
            added,
            removed,
        })
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn added(&self) -> &[ObjectRef] {
        &self.added
    }

    pub fn removed(&self) -> &[ObjectRef] {
        &self.removed
    }

    fn encode(&self) -> Result<JsonValue> {
        let pointers = |members: &[ObjectRef]| {
            members
                .iter()
                .map(encode_pointer)
                .collect::<Result<Vec<_>>>()
        };
        let adds = (!self.added.is_empty())
            .then(|| pointers(&self.added))
            .transpose()?
            .map(|objects| json!({"__op": "AddRelation", "objects": objects}));
        let removes = (!self.removed.is_empty())
            .then(|| pointers(&self.removed))
            .transpose()?
            .map(|objects| json!({"__op": "RemoveRelation", "objects": objects}));

        match (adds, removes) {
            (Some(add), Some(remove)) => Ok(json!({"__op": "Batch", "ops": [add, remove]})),
            (Some(op), None) | (None, Some(op)) => Ok(op),
            (None, None) => Err(Error::EncodingFailure(format!(
                "relation change on {} has no objects",
                self.target_class
            ))),
        }
    }
}

fn dedup(members: impl IntoIterator<Item = ObjectRef>) -> Vec<ObjectRef> {
    let mut out: Vec<ObjectRef> = Vec::new();
    for member in members {
        if !out.contains(&member) {
            out.push(member);
        }
    }
    out
}

/// A single pending mutation of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    /// Replace the value.
    Set(Value),
    /// Remove the field.
    Delete,
    /// Add to a numeric value.
    Increment(Number),
    /// Append to an array.
    Add(Vec<Value>),
    /// Append values not already in an array.
    AddUnique(Vec<Value>),
    /// Remove every occurrence of the values from an array.
    Remove(Vec<Value>),
    /// Add and/or remove relation members.
    Relation(RelationChange),
}

impl FieldOperation {
    /// Wire name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            FieldOperation::Set(_) => "Set",
            FieldOperation::Delete => "Delete",
            FieldOperation::Increment(_) => "Increment",
            FieldOperation::Add(_) => "Add",
            FieldOperation::AddUnique(_) => "AddUnique",
            FieldOperation::Remove(_) => "Remove",
            FieldOperation::Relation(_) => "Relation",
        }
    }

    /// Compute the locally visible value after this operation.
    ///
    /// `None` means the field is absent. Array operations leave the cached
    /// value untouched; the authoritative array comes back from the server.
    pub fn apply(&self, old: Option<&Value>) -> Result<Option<Value>> {
        match self {
            FieldOperation::Set(value) => Ok(Some(value.clone())),
            FieldOperation::Delete => Ok(None),
            FieldOperation::Increment(amount) => match old {
                None => Ok(Some(Value::Number(*amount))),
                Some(Value::Number(current)) => Ok(Some(Value::Number(*current + *amount))),
                Some(other) => Err(Error::InvalidOperation(format!(
                    "you cannot increment a non-number ({})",
                    other.kind_name()
                ))),
            },
            FieldOperation::Add(_) | FieldOperation::AddUnique(_) | FieldOperation::Remove(_) => {
                Ok(old.cloned())
            }
            FieldOperation::Relation(change) => match old {
                None => Ok(Some(Value::Relation(Relation::new(change.target_class())))),
                Some(Value::Relation(relation)) => {
                    let mut relation = relation.clone();
                    relation
                        .ensure_target_class(change.target_class())
                        .map_err(|e| Error::InvalidOperation(e.message()))?;
                    Ok(Some(Value::Relation(relation)))
                }
                Some(other) => Err(Error::InvalidOperation(format!(
                    "a relation change cannot be applied to a {} value",
                    other.kind_name()
                ))),
            },
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<JsonValue> {
        let objects = |values: &[Value]| {
            values
                .iter()
                .map(|value| encode(value, ObjectEncoding::Pointer))
                .collect::<Result<Vec<_>>>()
        };
        match self {
            FieldOperation::Set(value) => encode(value, ObjectEncoding::Pointer),
            FieldOperation::Delete => Ok(json!({"__op": "Delete"})),
            FieldOperation::Increment(amount) => {
                Ok(json!({"__op": "Increment", "amount": encode_number(*amount)?}))
            }
            FieldOperation::Add(values) => Ok(json!({"__op": "Add", "objects": objects(values)?})),
            FieldOperation::AddUnique(values) => {
                Ok(json!({"__op": "AddUnique", "objects": objects(values)?}))
            }
            FieldOperation::Remove(values) => {
                Ok(json!({"__op": "Remove", "objects": objects(values)?}))
            }
            FieldOperation::Relation(change) => change.encode(),
        }
    }

    /// Combine with the operation already pending on the same field.
    ///
    /// Increments accumulate (onto a prior set or delete as well), array
    /// appends of the same kind accumulate, everything else replaces.
    pub fn merge_with_previous(self, previous: Option<&FieldOperation>) -> FieldOperation {
        use FieldOperation::*;

        match (self, previous) {
            (Increment(amount), Some(Increment(prior))) => Increment(*prior + amount),
            (Increment(amount), Some(Set(Value::Number(prior)))) => {
                Set(Value::Number(*prior + amount))
            }
            (Increment(amount), Some(Delete)) => Set(Value::Number(amount)),
            (Add(values), Some(Add(prior))) => {
                let mut merged = prior.clone();
                merged.extend(values);
                Add(merged)
            }
            (AddUnique(values), Some(AddUnique(prior))) => AddUnique(union(prior, values)),
            (Remove(values), Some(Remove(prior))) => Remove(union(prior, values)),
            (op, _) => op,
        }
    }
}

fn union(prior: &[Value], values: Vec<Value>) -> Vec<Value> {
    let mut merged = prior.to_vec();
    for value in values {
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    merged
}
