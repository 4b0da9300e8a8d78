//! Query construction.
//!
//! A [`Query`] is a plain description of constraints; it is encoded into GET
//! parameters only when [`Synchronizer::find`](crate::Synchronizer::find) or
//! friends run it, so building one never fails.

use crate::encode::{encode, encode_pointer, ObjectEncoding};
use crate::error::Result;
use crate::{ObjectRef, Value};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Constraint {
    Equal(Value),
    Compare(&'static str, Value),
    Set(&'static str, Vec<Value>),
    Exists(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    class_name: String,
    constraints: BTreeMap<String, Vec<Constraint>>,
    related_to: Option<(ObjectRef, String)>,
    redirect_key: Option<String>,
    limit: Option<u32>,
    skip: Option<u32>,
    order: Vec<String>,
    include: Vec<String>,
    keys: Vec<String>,
}

impl Query {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            constraints: BTreeMap::new(),
            related_to: None,
            redirect_key: None,
            limit: None,
            skip: None,
            order: Vec::new(),
            include: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    fn constrain(mut self, key: &str, constraint: Constraint) -> Self {
        self.constraints
            .entry(key.to_string())
            .or_default()
            .push(constraint);
        self
    }

    pub fn where_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.constrain(key, Constraint::Equal(value.into()))
    }

    pub fn where_not_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.constrain(key, Constraint::Compare("$ne", value.into()))
    }

    pub fn where_greater_than(self, key: &str, value: impl Into<Value>) -> Self {
        self.constrain(key, Constraint::Compare("$gt", value.into()))
    }

    pub fn where_greater_than_or_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.constrain(key, Constraint::Compare("$gte", value.into()))
    }

    pub fn where_less_than(self, key: &str, value: impl Into<Value>) -> Self {
        self.constrain(key, Constraint::Compare("$lt", value.into()))
    }

    pub fn where_less_than_or_equal_to(self, key: &str, value: impl Into<Value>) -> Self {
        self.constrain(key, Constraint::Compare("$lte", value.into()))
    }

    pub fn where_contained_in(self, key: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.constrain(key, Constraint::Set("$in", values.into_iter().collect()))
    }

    pub fn where_not_contained_in(
        self,
        key: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.constrain(key, Constraint::Set("$nin", values.into_iter().collect()))
    }

    pub fn where_exists(self, key: &str) -> Self {
        self.constrain(key, Constraint::Exists(true))
    }

    pub fn where_does_not_exist(self, key: &str) -> Self {
        self.constrain(key, Constraint::Exists(false))
    }

    /// Objects that are members of `key` relation on `parent`.
    pub fn where_related_to(mut self, parent: ObjectRef, key: &str) -> Self {
        self.related_to = Some((parent, key.to_string()));
        self
    }

    /// Ask the server to answer with the class of the relation under `key`.
    pub fn redirect_class_name_for_key(mut self, key: &str) -> Self {
        self.redirect_key = Some(key.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn order_by_ascending(mut self, key: &str) -> Self {
        self.order.push(key.to_string());
        self
    }

    pub fn order_by_descending(mut self, key: &str) -> Self {
        self.order.push(format!("-{key}"));
        self
    }

    /// Return the objects pointed to by `key` in full.
    pub fn include(mut self, key: &str) -> Self {
        self.include.push(key.to_string());
        self
    }

    /// Restrict returned fields.
    pub fn select_keys<'k>(mut self, keys: impl IntoIterator<Item = &'k str>) -> Self {
        self.keys.extend(keys.into_iter().map(str::to_string));
        self
    }

    /// The `where` clause. An equality constraint wins over any other
    /// constraint on the same key.
    pub fn encode_where(&self) -> Result<Map<String, JsonValue>> {
        let value = |v: &Value| encode(v, ObjectEncoding::Pointer);
        let mut clause = Map::new();
        for (key, constraints) in &self.constraints {
            let equal = constraints.iter().rev().find_map(|c| match c {
                Constraint::Equal(v) => Some(v),
                _ => None,
            });
            if let Some(v) = equal {
                clause.insert(key.clone(), value(v)?);
                continue;
            }
            let mut operators = Map::new();
            for constraint in constraints {
                match constraint {
                    Constraint::Compare(op, v) => {
                        operators.insert((*op).to_string(), value(v)?);
                    }
                    Constraint::Set(op, values) => {
                        let encoded = values.iter().map(value).collect::<Result<Vec<_>>>()?;
                        operators.insert((*op).to_string(), JsonValue::Array(encoded));
                    }
                    Constraint::Exists(exists) => {
                        operators.insert("$exists".into(), JsonValue::Bool(*exists));
                    }
                    Constraint::Equal(_) => {}
                }
            }
            clause.insert(key.clone(), JsonValue::Object(operators));
        }
        if let Some((parent, key)) = &self.related_to {
            clause.insert(
                "$relatedTo".into(),
                json!({"object": encode_pointer(parent)?, "key": key}),
            );
        }
        Ok(clause)
    }

    /// GET parameters. With `count`, asks only for the number of matches.
    pub fn to_params(&self, count: bool) -> Result<Vec<(String, String)>> {
        let mut params = Vec::new();
        let clause = self.encode_where()?;
        if !clause.is_empty() {
            params.push(("where".into(), JsonValue::Object(clause).to_string()));
        }
        if count {
            params.push(("count".into(), "1".into()));
            params.push(("limit".into(), "0".into()));
        } else {
            if let Some(limit) = self.limit {
                params.push(("limit".into(), limit.to_string()));
            }
            if let Some(skip) = self.skip {
                params.push(("skip".into(), skip.to_string()));
            }
            if !self.order.is_empty() {
                params.push(("order".into(), self.order.join(",")));
            }
        }
        if !self.include.is_empty() {
            params.push(("include".into(), self.include.join(",")));
        }
        if !self.keys.is_empty() {
            params.push(("keys".into(), self.keys.join(",")));
        }
        if let Some(key) = &self.redirect_key {
            params.push(("redirectClassNameForKey".into(), key.clone()));
        }
        Ok(params)
    }
}
