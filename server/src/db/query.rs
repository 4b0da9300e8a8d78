//! `where` constraint evaluation and result ordering.

use super::ops::{as_pointer, same_item};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use nimbus_engine::encode::decode_date;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A parsed `where` clause.
#[derive(Debug, Default, Clone)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
    related_to: Option<RelatedTo>,
}

/// `$relatedTo`: members of `key` on the given owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTo {
    pub class_name: String,
    pub object_id: String,
    pub key: String,
}

#[derive(Debug, Clone)]
enum Condition {
    Equal(Value),
    NotEqual(Value),
    Compare(Ordering, bool, Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Exists(bool),
}

impl Filter {
    /// Parse the JSON `where` parameter.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Ok(Self::default());
        };
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::InvalidJson(format!("where is not valid JSON: {e}")))?;
        let Value::Object(clauses) = value else {
            return Err(AppError::InvalidQuery("where must be a JSON object".into()));
        };

        let mut filter = Self::default();
        for (key, constraint) in clauses {
            if key == "$relatedTo" {
                filter.related_to = Some(parse_related_to(&constraint)?);
                continue;
            }
            match constraint {
                Value::Object(ref ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    for (op, operand) in ops {
                        filter.conditions.push((key.clone(), parse_condition(op, operand)?));
                    }
                }
                other => filter.conditions.push((key, Condition::Equal(other))),
            }
        }
        Ok(filter)
    }

    pub fn related_to(&self) -> Option<&RelatedTo> {
        self.related_to.as_ref()
    }

    /// Evaluate against an object in response form (fields plus reserved keys).
    pub fn matches(&self, object: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(key, condition)| condition.matches(object.get(key)))
    }
}

fn parse_related_to(value: &Value) -> Result<RelatedTo> {
    let object = value
        .get("object")
        .and_then(|o| as_pointer(o))
        .ok_or_else(|| AppError::InvalidQuery("$relatedTo needs an object pointer".into()))?;
    let key = value
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::InvalidQuery("$relatedTo needs a key".into()))?;
    Ok(RelatedTo {
        class_name: object.0.to_string(),
        object_id: object.1.to_string(),
        key: key.to_string(),
    })
}

fn parse_condition(op: &str, operand: &Value) -> Result<Condition> {
    let list = || {
        operand
            .as_array()
            .cloned()
            .ok_or_else(|| AppError::InvalidQuery(format!("{op} needs an array")))
    };
    Ok(match op {
        "$ne" => Condition::NotEqual(operand.clone()),
        "$gt" => Condition::Compare(Ordering::Greater, false, operand.clone()),
        "$gte" => Condition::Compare(Ordering::Greater, true, operand.clone()),
        "$lt" => Condition::Compare(Ordering::Less, false, operand.clone()),
        "$lte" => Condition::Compare(Ordering::Less, true, operand.clone()),
        "$in" => Condition::In(list()?),
        "$nin" => Condition::NotIn(list()?),
        "$exists" => Condition::Exists(
            operand
                .as_bool()
                .ok_or_else(|| AppError::InvalidQuery("$exists needs a boolean".into()))?,
        ),
        other => return Err(AppError::InvalidQuery(format!("unsupported operator {other}"))),
    })
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        let present = field.filter(|v| !v.is_null());
        match self {
            Condition::Equal(expected) => present.is_some_and(|v| equals(v, expected)),
            Condition::NotEqual(expected) => !present.is_some_and(|v| equals(v, expected)),
            Condition::Compare(direction, inclusive, bound) => present
                .and_then(|v| compare(v, bound))
                .is_some_and(|ord| ord == *direction || (*inclusive && ord == Ordering::Equal)),
            Condition::In(options) => {
                present.is_some_and(|v| options.iter().any(|o| equals(v, o)))
            }
            Condition::NotIn(options) => {
                !present.is_some_and(|v| options.iter().any(|o| equals(v, o)))
            }
            Condition::Exists(wanted) => present.is_some() == *wanted,
        }
    }
}

/// Equality where an array field matches any of its elements.
fn equals(field: &Value, expected: &Value) -> bool {
    if same_item(field, expected) || dates_equal(field, expected) {
        return true;
    }
    match (field, expected) {
        (Value::Array(items), other) if !other.is_array() => {
            items.iter().any(|item| same_item(item, other))
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(_) => decode_date(value).ok(),
        Value::Object(map) if map.get("__type").and_then(Value::as_str) == Some("Date") => {
            decode_date(value).ok()
        }
        _ => None,
    }
}

fn dates_equal(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Object(_), _) | (_, Value::Object(_)))
        && matches!((as_date(a), as_date(b)), (Some(x), Some(y)) if x == y)
}

/// Ordering between two values of a comparable kind.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (as_date(a), as_date(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        _ => Some(as_date(a)?.cmp(&as_date(b)?)),
    }
}

/// Sort by a comma separated `order` list; `-key` sorts descending.
/// Missing values sort first.
pub fn sort(objects: &mut [Map<String, Value>], order: &str) {
    let keys: Vec<(&str, bool)> = order
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| match k.strip_prefix('-') {
            Some(key) => (key, true),
            None => (k, false),
        })
        .collect();
    if keys.is_empty() {
        return;
    }

    objects.sort_by(|a, b| {
        for (key, descending) in &keys {
            let ord = match (a.get(*key), b.get(*key)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_and_comparisons() {
        let filter = Filter::parse(Some(r#"{"team":"red","score":{"$gte":10,"$lt":20}}"#)).unwrap();
        assert!(filter.matches(&object(json!({"team": "red", "score": 10}))));
        assert!(!filter.matches(&object(json!({"team": "red", "score": 20}))));
        assert!(!filter.matches(&object(json!({"team": "blue", "score": 15}))));
        assert!(!filter.matches(&object(json!({"team": "red"}))));
    }

    #[test]
    fn membership_and_existence() {
        let filter =
            Filter::parse(Some(r#"{"tag":{"$in":["a","b"]},"gone":{"$exists":false}}"#)).unwrap();
        assert!(filter.matches(&object(json!({"tag": "a"}))));
        assert!(!filter.matches(&object(json!({"tag": "a", "gone": 1}))));
        assert!(!filter.matches(&object(json!({"tag": "c"}))));

        let filter = Filter::parse(Some(r#"{"tag":{"$nin":["a"]},"x":{"$ne":1}}"#)).unwrap();
        assert!(filter.matches(&object(json!({"tag": "c"}))));
        assert!(filter.matches(&object(json!({}))));
        assert!(!filter.matches(&object(json!({"tag": "c", "x": 1}))));
    }

    #[test]
    fn array_fields_match_elements() {
        let filter = Filter::parse(Some(r#"{"tags":"rust"}"#)).unwrap();
        assert!(filter.matches(&object(json!({"tags": ["go", "rust"]}))));
    }

    #[test]
    fn pointers_match_by_identity() {
        let filter = Filter::parse(Some(
            r#"{"author":{"__type":"Pointer","className":"_User","objectId":"u1"}}"#,
        ))
        .unwrap();
        assert!(filter.matches(&object(json!({
            "author": {"__type": "Pointer", "className": "_User", "objectId": "u1"}
        }))));
    }

    #[test]
    fn dates_compare_chronologically() {
        let filter = Filter::parse(Some(
            r#"{"createdAt":{"$gt":{"__type":"Date","iso":"2024-01-01T00:00:00.000Z"}}}"#,
        ))
        .unwrap();
        assert!(filter.matches(&object(json!({"createdAt": "2024-06-01T00:00:00.000Z"}))));
        assert!(!filter.matches(&object(json!({"createdAt": "2023-06-01T00:00:00.000Z"}))));
    }

    #[test]
    fn related_to_is_extracted() {
        let clause = json!({"$relatedTo": {
            "object": {"__type": "Pointer", "className": "Post", "objectId": "p1"},
            "key": "tags"
        }})
        .to_string();
        let filter = Filter::parse(Some(&clause)).unwrap();
        assert_eq!(
            filter.related_to(),
            Some(&RelatedTo {
                class_name: "Post".into(),
                object_id: "p1".into(),
                key: "tags".into()
            })
        );
    }

    #[test]
    fn bad_where_clauses() {
        assert_eq!(Filter::parse(Some("{nope")).unwrap_err().code(), 107);
        assert_eq!(Filter::parse(Some("[1]")).unwrap_err().code(), 102);
        assert_eq!(Filter::parse(Some(r#"{"a":{"$regex":"x"}}"#)).unwrap_err().code(), 102);
    }

    #[test]
    fn sort_by_multiple_keys() {
        let mut objects = vec![
            object(json!({"id": 1, "team": "b", "score": 1})),
            object(json!({"id": 2, "team": "a", "score": 5})),
            object(json!({"id": 3, "team": "a", "score": 9})),
            object(json!({"id": 4})),
        ];
        sort(&mut objects, "team,-score");
        let ids: Vec<_> = objects.iter().map(|o| o["id"].clone()).collect();
        assert_eq!(ids, vec![json!(4), json!(3), json!(2), json!(1)]);
    }
}
