//! Applying request bodies to stored field maps.
//!
//! A body maps keys either to plain values (a set) or to `{"__op": ...}`
//! operations. Everything is applied to a copy so a rejected body leaves the
//! stored object untouched.

use crate::error::{AppError, Result};
use nimbus_engine::{is_reserved_key, Number};
use serde_json::{Map, Value};

/// One relation membership edit, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEdit {
    Add { key: String, object_ids: Vec<String> },
    Remove { key: String, object_ids: Vec<String> },
}

/// Result of applying a body.
#[derive(Debug, Default)]
pub struct Applied {
    /// The complete field map after the body.
    pub fields: Map<String, Value>,
    /// Computed values returned to the caller (increment results, arrays).
    pub echo: Map<String, Value>,
    pub relation_edits: Vec<RelationEdit>,
}

/// Apply `body` on top of `current`.
pub fn apply_body(current: &Map<String, Value>, body: &Map<String, Value>) -> Result<Applied> {
    let mut applied = Applied {
        fields: current.clone(),
        ..Applied::default()
    };

    for (key, value) in body {
        validate_key(key)?;
        apply_value(&mut applied, key, value)?;
    }
    Ok(applied)
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AppError::InvalidKeyName("field names must not be empty".into()));
    }
    if is_reserved_key(key) {
        return Err(AppError::InvalidKeyName(format!(
            "{key} is a reserved field and cannot be modified"
        )));
    }
    if key.starts_with('$') || key.starts_with("__") {
        return Err(AppError::InvalidKeyName(format!("invalid field name: {key}")));
    }
    Ok(())
}

fn apply_value(applied: &mut Applied, key: &str, value: &Value) -> Result<()> {
    let Some(op) = value.get("__op") else {
        applied.fields.insert(key.to_string(), value.clone());
        return Ok(());
    };
    let op = op
        .as_str()
        .ok_or_else(|| AppError::InvalidJson(format!("__op for {key} must be a string")))?;

    match op {
        "Delete" => {
            applied.fields.remove(key);
            applied.echo.remove(key);
        }
        "Increment" => {
            let amount = number_field(value, "amount", key)?;
            let result = match applied.fields.get(key) {
                None | Some(Value::Null) => amount,
                Some(Value::Number(current)) => Number::from_json(current) + amount,
                Some(_) => {
                    return Err(AppError::IncorrectType(format!(
                        "cannot increment a non-number field {key}"
                    )))
                }
            };
            let result = result.to_json().map(Value::Number).ok_or_else(|| {
                AppError::InvalidJson(format!("increment of {key} is not a finite number"))
            })?;
            applied.fields.insert(key.to_string(), result.clone());
            applied.echo.insert(key.to_string(), result);
        }
        "Add" | "AddUnique" | "Remove" => {
            let objects = objects_field(value, key)?;
            let mut array = match applied.fields.get(key) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(_) => {
                    return Err(AppError::IncorrectType(format!(
                        "{op} requires {key} to be an array"
                    )))
                }
            };
            match op {
                "Add" => array.extend(objects.iter().cloned()),
                "AddUnique" => {
                    for object in objects {
                        if !array.iter().any(|existing| same_item(existing, object)) {
                            array.push(object.clone());
                        }
                    }
                }
                _ => array.retain(|existing| !objects.iter().any(|o| same_item(existing, o))),
            }
            let array = Value::Array(array);
            applied.fields.insert(key.to_string(), array.clone());
            applied.echo.insert(key.to_string(), array);
        }
        "AddRelation" | "RemoveRelation" => {
            let objects = objects_field(value, key)?;
            let (target_class, object_ids) = pointer_targets(objects, key)?;
            match applied.fields.get(key) {
                None | Some(Value::Null) => {}
                Some(existing) if relation_class(existing) == Some(target_class.as_str()) => {}
                Some(_) => {
                    return Err(AppError::IncorrectType(format!(
                        "{key} is not a relation to {target_class}"
                    )))
                }
            }
            applied.fields.insert(
                key.to_string(),
                serde_json::json!({"__type": "Relation", "className": target_class}),
            );
            let edit = if op == "AddRelation" {
                RelationEdit::Add {
                    key: key.to_string(),
                    object_ids,
                }
            } else {
                RelationEdit::Remove {
                    key: key.to_string(),
                    object_ids,
                }
            };
            applied.relation_edits.push(edit);
        }
        "Batch" => {
            let ops = value
                .get("ops")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AppError::InvalidJson(format!("Batch for {key} needs an ops array"))
                })?;
            for nested in ops {
                apply_value(applied, key, nested)?;
            }
        }
        other => {
            return Err(AppError::InvalidJson(format!("unknown operation {other} for {key}")));
        }
    }
    Ok(())
}

fn number_field(value: &Value, field: &str, key: &str) -> Result<Number> {
    match value.get(field) {
        Some(Value::Number(n)) => Ok(Number::from_json(n)),
        _ => Err(AppError::IncorrectType(format!(
            "Increment of {key} requires a numeric amount"
        ))),
    }
}

fn objects_field<'a>(value: &'a Value, key: &str) -> Result<&'a [Value]> {
    value
        .get("objects")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| AppError::InvalidJson(format!("operation on {key} needs an objects array")))
}

/// Target class and ids of a list of pointers, all of one class.
fn pointer_targets(objects: &[Value], key: &str) -> Result<(String, Vec<String>)> {
    let mut class_name: Option<&str> = None;
    let mut ids = Vec::with_capacity(objects.len());
    for object in objects {
        let (class, id) = as_pointer(object).ok_or_else(|| {
            AppError::InvalidPointer(format!("relation {key} only accepts pointers"))
        })?;
        match class_name {
            Some(existing) if existing != class => {
                return Err(AppError::IncorrectType(format!(
                    "relation {key} cannot mix {existing} and {class}"
                )))
            }
            _ => class_name = Some(class),
        }
        ids.push(id.to_string());
    }
    let class_name = class_name
        .ok_or_else(|| AppError::InvalidJson(format!("relation operation on {key} is empty")))?;
    Ok((class_name.to_string(), ids))
}

/// `(className, objectId)` of a pointer or embedded object.
pub fn as_pointer(value: &Value) -> Option<(&str, &str)> {
    let kind = value.get("__type")?.as_str()?;
    if kind != "Pointer" && kind != "Object" {
        return None;
    }
    Some((
        value.get("className")?.as_str()?,
        value.get("objectId")?.as_str()?,
    ))
}

pub fn relation_class(value: &Value) -> Option<&str> {
    (value.get("__type")?.as_str()? == "Relation")
        .then(|| value.get("className")?.as_str())
        .flatten()
}

/// Array membership: pointers compare by identity, everything else by value.
pub fn same_item(a: &Value, b: &Value) -> bool {
    match (as_pointer(a), as_pointer(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
