//! Batch handler - runs many object requests from one call.

use super::objects::{
    class_for_endpoint, create_object, delete_object, get_object, update_object,
};
use crate::db::ObjectStore;
use crate::error::{AppError, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Maximum number of sub-requests in one batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// Request body for a batch.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub requests: Vec<SubRequest>,
}

/// One request inside a batch.
#[derive(Debug, Deserialize)]
pub struct SubRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Where a sub-request path points.
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    Class(&'a str),
    Object(&'a str, &'a str),
}

/// Run every sub-request in order. Each yields `{"success": ...}` or
/// `{"error": {"code", "error"}}`; one failure does not stop the rest.
pub fn run_batch(store: &ObjectStore, mount_path: &str, body: &[u8]) -> Result<Value> {
    let request: BatchRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidJson(format!("invalid batch request: {e}")))?;

    if request.requests.len() > MAX_BATCH_SIZE {
        return Err(AppError::TooManyCommands {
            count: request.requests.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    tracing::debug!(count = request.requests.len(), "Running batch");

    let results = request
        .requests
        .iter()
        .map(|sub| match dispatch(store, mount_path, sub) {
            Ok(success) => json!({ "success": success }),
            Err(e) => {
                tracing::debug!(path = %sub.path, code = e.code(), "Batch entry failed: {}", e);
                json!({ "error": e.to_body() })
            }
        })
        .collect();
    Ok(Value::Array(results))
}

fn dispatch(store: &ObjectStore, mount_path: &str, sub: &SubRequest) -> Result<Value> {
    let target = route(mount_path, &sub.path)
        .ok_or_else(|| AppError::InvalidJson(format!("cannot route batch path {}", sub.path)))?;
    let body = match &sub.body {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(AppError::InvalidJson(
                "batch request body must be a JSON object".into(),
            ))
        }
    };

    match (sub.method.to_ascii_uppercase().as_str(), target) {
        ("POST", Target::Class(class)) => create_object(store, class, &body).map(|(_, v)| v),
        ("GET", Target::Object(class, id)) => get_object(store, class, id),
        ("PUT", Target::Object(class, id)) => update_object(store, class, id, &body),
        ("DELETE", Target::Object(class, id)) => delete_object(store, class, id),
        (method, _) => Err(AppError::InvalidJson(format!(
            "{method} is not supported for {} in a batch",
            sub.path
        ))),
    }
}

/// Resolve `<mount>/classes/<class>[/<id>]` or an aliased endpoint.
fn route<'a>(mount_path: &str, path: &'a str) -> Option<Target<'a>> {
    let rest = path.strip_prefix(mount_path)?;
    if !mount_path.is_empty() && !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["classes", class] => Some(Target::Class(*class)),
        ["classes", class, id] => Some(Target::Object(*class, *id)),
        [endpoint] => class_for_endpoint(endpoint).map(Target::Class),
        [endpoint, id] => class_for_endpoint(endpoint).map(|class| Target::Object(class, *id)),
        _ => None,
    }
}
