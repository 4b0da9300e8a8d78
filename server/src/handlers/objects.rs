//! Object handlers shared by the REST routes and batch dispatch.

use crate::db::{FindOptions, Filter, ObjectStore};
use crate::error::{AppError, Result};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Default page size of a class listing.
const DEFAULT_LIMIT: usize = 100;

/// Maximum page size of a class listing.
const MAX_LIMIT: usize = 1000;

/// Query parameters of a class listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindParams {
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub order: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub keys: Option<String>,
    pub include: Option<String>,
    pub count: Option<String>,
    pub redirect_class_name_for_key: Option<String>,
}

/// Map an endpoint segment to the class it serves.
pub fn class_for_endpoint(segment: &str) -> Option<&'static str> {
    match segment {
        "users" => Some("_User"),
        "roles" => Some("_Role"),
        "installations" => Some("_Installation"),
        _ => None,
    }
}

pub fn validate_class_name(class_name: &str) -> Result<()> {
    let mut chars = class_name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidClassName(class_name.to_string()))
    }
}

/// Parse a request body into a JSON object. An empty body is an empty object.
pub fn parse_body(bytes: &[u8]) -> Result<Map<String, Value>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::InvalidJson("request body must be a JSON object".into())),
        Err(e) => Err(AppError::InvalidJson(format!("invalid JSON: {e}"))),
    }
}

pub fn create_object(
    store: &ObjectStore,
    class_name: &str,
    body: &Map<String, Value>,
) -> Result<(StatusCode, Value)> {
    validate_class_name(class_name)?;
    let written = store.create(class_name, body)?;

    let mut response = written.echo;
    let full = written.object.to_json();
    response.insert("objectId".into(), full["objectId"].clone());
    response.insert("createdAt".into(), full["createdAt"].clone());
    Ok((StatusCode::CREATED, Value::Object(response)))
}

pub fn get_object(store: &ObjectStore, class_name: &str, object_id: &str) -> Result<Value> {
    validate_class_name(class_name)?;
    Ok(Value::Object(store.get(class_name, object_id)?.to_json()))
}

pub fn update_object(
    store: &ObjectStore,
    class_name: &str,
    object_id: &str,
    body: &Map<String, Value>,
) -> Result<Value> {
    validate_class_name(class_name)?;
    let written = store.update(class_name, object_id, body)?;

    let mut response = written.echo;
    response.insert(
        "updatedAt".into(),
        written.object.to_json()["updatedAt"].clone(),
    );
    Ok(Value::Object(response))
}

pub fn delete_object(store: &ObjectStore, class_name: &str, object_id: &str) -> Result<Value> {
    validate_class_name(class_name)?;
    store.delete(class_name, object_id)?;
    Ok(json!({}))
}

/// List a class: `{"results": [...]}`, plus `count` when asked for and
/// `className` when a relation query was redirected to the target class.
pub fn find_objects(store: &ObjectStore, class_name: &str, params: &FindParams) -> Result<Value> {
    validate_class_name(class_name)?;
    let filter = Filter::parse(params.where_clause.as_deref())?;

    let mut class_name = class_name.to_string();
    let mut redirected = false;
    if let (Some(key), Some(related)) = (&params.redirect_class_name_for_key, filter.related_to()) {
        let owner = store.get(&related.class_name, &related.object_id)?;
        let target = owner
            .fields
            .get(key)
            .and_then(|field| field.get("className"))
            .and_then(Value::as_str);
        if let Some(target) = target {
            class_name = target.to_string();
            redirected = true;
        }
    }

    let count = params.count.as_deref() == Some("1");
    let limit = match parse_usize(params.limit.as_deref(), "limit")? {
        Some(limit) => limit.min(MAX_LIMIT),
        None => DEFAULT_LIMIT,
    };
    let options = FindOptions {
        filter,
        order: params.order.clone(),
        skip: parse_usize(params.skip.as_deref(), "skip")?.unwrap_or(0),
        limit,
    };

    let (mut results, total) = store.find(&class_name, &options);
    if let Some(include) = &params.include {
        for object in &mut results {
            include_pointers(store, object, include);
        }
    }
    if let Some(keys) = &params.keys {
        for object in &mut results {
            select_keys(object, keys);
        }
    }

    let mut response = Map::new();
    response.insert(
        "results".into(),
        Value::Array(results.into_iter().map(Value::Object).collect()),
    );
    if count {
        response.insert("count".into(), json!(total));
    }
    if redirected {
        response.insert("className".into(), Value::String(class_name));
    }
    Ok(Value::Object(response))
}

fn parse_usize(raw: Option<&str>, name: &str) -> Result<Option<usize>> {
    raw.map(|raw| {
        raw.trim()
            .parse()
            .map_err(|_| AppError::InvalidQuery(format!("{name} must be a non-negative integer")))
    })
    .transpose()
}

/// Replace top-level pointer fields named in `include` with embedded objects.
fn include_pointers(store: &ObjectStore, object: &mut Map<String, Value>, include: &str) {
    for path in include.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let key = path.split('.').next().unwrap_or(path);
        let Some(field) = object.get(key) else {
            continue;
        };
        if field.get("__type").and_then(Value::as_str) != Some("Pointer") {
            continue;
        }
        let (Some(class), Some(id)) = (
            field.get("className").and_then(Value::as_str),
            field.get("objectId").and_then(Value::as_str),
        ) else {
            continue;
        };
        if let Ok(target) = store.get(class, id) {
            let mut embedded = target.to_json();
            embedded.insert("__type".into(), json!("Object"));
            embedded.insert("className".into(), json!(class));
            object.insert(key.to_string(), Value::Object(embedded));
        }
    }
}

/// Keep only the named keys plus `objectId`, `createdAt` and `updatedAt`.
fn select_keys(object: &mut Map<String, Value>, keys: &str) {
    let wanted: Vec<&str> = keys
        .split(',')
        .map(|k| k.trim().split('.').next().unwrap_or(""))
        .filter(|k| !k.is_empty())
        .collect();
    object.retain(|key, _| {
        nimbus_engine::is_reserved_key(key) || wanted.contains(&key.as_str())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn class_names() {
        assert!(validate_class_name("GameScore").is_ok());
        assert!(validate_class_name("_User").is_ok());
        assert_eq!(validate_class_name("1abc").unwrap_err().code(), 103);
        assert_eq!(validate_class_name("").unwrap_err().code(), 103);
        assert_eq!(validate_class_name("a-b").unwrap_err().code(), 103);
    }

    #[test]
    fn bodies() {
        assert!(parse_body(b"").unwrap().is_empty());
        assert_eq!(parse_body(b"[1]").unwrap_err().code(), 107);
        assert_eq!(parse_body(b"{oops").unwrap_err().code(), 107);
        assert_eq!(parse_body(br#"{"a":1}"#).unwrap()["a"], json!(1));
    }

    #[test]
    fn create_echoes_computed_fields() {
        let store = ObjectStore::new();
        let (status, response) = create_object(
            &store,
            "Post",
            &body(json!({"title": "x", "views": {"__op": "Increment", "amount": 1}})),
        )
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(response["objectId"].is_string());
        assert!(response["createdAt"].is_string());
        assert_eq!(response["views"], json!(1));
        assert!(response.get("title").is_none());
    }

    #[test]
    fn find_with_count_keys_and_include() {
        let store = ObjectStore::new();
        let (_, user) = create_object(&store, "_User", &body(json!({"name": "ann"}))).unwrap();
        let user_id = user["objectId"].as_str().unwrap();
        for i in 0..3 {
            create_object(
                &store,
                "Post",
                &body(json!({
                    "n": i,
                    "secret": true,
                    "author": {"__type": "Pointer", "className": "_User", "objectId": user_id}
                })),
            )
            .unwrap();
        }

        let params = FindParams {
            count: Some("1".into()),
            limit: Some("2".into()),
            keys: Some("n,author".into()),
            include: Some("author".into()),
            order: Some("-n".into()),
            ..FindParams::default()
        };
        let response = find_objects(&store, "Post", &params).unwrap();
        assert_eq!(response["count"], json!(3));
        let results = response["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["n"], json!(2));
        assert!(results[0].get("secret").is_none());
        assert_eq!(results[0]["author"]["__type"], json!("Object"));
        assert_eq!(results[0]["author"]["name"], json!("ann"));
    }

    #[test]
    fn relation_query_redirects_to_target_class() {
        let store = ObjectStore::new();
        let (_, tag) = create_object(&store, "Tag", &body(json!({"label": "rust"}))).unwrap();
        let tag_id = tag["objectId"].as_str().unwrap();
        let (_, post) = create_object(
            &store,
            "Post",
            &body(json!({"tags": {"__op": "AddRelation", "objects": [
                {"__type": "Pointer", "className": "Tag", "objectId": tag_id}
            ]}})),
        )
        .unwrap();
        let post_id = post["objectId"].as_str().unwrap();

        let params = FindParams {
            where_clause: Some(
                json!({"$relatedTo": {
                    "object": {"__type": "Pointer", "className": "Post", "objectId": post_id},
                    "key": "tags"
                }})
                .to_string(),
            ),
            redirect_class_name_for_key: Some("tags".into()),
            ..FindParams::default()
        };
        let response = find_objects(&store, "Post", &params).unwrap();
        assert_eq!(response["className"], json!("Tag"));
        assert_eq!(response["results"][0]["label"], json!("rust"));
    }

    #[test]
    fn bad_paging_parameters() {
        let store = ObjectStore::new();
        let params = FindParams {
            limit: Some("-1".into()),
            ..FindParams::default()
        };
        assert_eq!(find_objects(&store, "Post", &params).unwrap_err().code(), 102);
    }
}
