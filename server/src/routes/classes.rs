//! Object endpoint routes.
//!
//! `/classes/{class}` serves any class; `/users`, `/roles` and
//! `/installations` serve the built-in classes under their own endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::auth::AppId;
use crate::error::Result;
use crate::handlers::{
    create_object, delete_object, find_objects, get_object, parse_body, update_object, FindParams,
};
use crate::AppState;

/// Create object routes.
pub fn routes() -> Router<AppState> {
    let router = Router::new()
        .route(
            "/classes/{class_name}",
            get(find_in_class).post(create_in_class),
        )
        .route(
            "/classes/{class_name}/{object_id}",
            get(fetch_in_class)
                .put(update_in_class)
                .delete(remove_in_class),
        );

    [
        ("users", "_User"),
        ("roles", "_Role"),
        ("installations", "_Installation"),
    ]
    .into_iter()
    .fold(router, |router, (endpoint, class)| {
        router.merge(endpoint_routes(endpoint, class))
    })
}

async fn find_in_class(
    state: State<AppState>,
    _app: AppId,
    Path(class): Path<String>,
    params: Query<FindParams>,
) -> Result<Json<Value>> {
    find(state, class, params).await
}

async fn create_in_class(
    state: State<AppState>,
    _app: AppId,
    Path(class): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    create(state, class, body).await
}

async fn fetch_in_class(
    state: State<AppState>,
    _app: AppId,
    Path((class, id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    fetch(state, class, id).await
}

async fn update_in_class(
    state: State<AppState>,
    _app: AppId,
    Path((class, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>> {
    update(state, class, id, body).await
}

async fn remove_in_class(
    state: State<AppState>,
    _app: AppId,
    Path((class, id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    remove(state, class, id).await
}

/// Routes for a class served under its own endpoint.
fn endpoint_routes(endpoint: &'static str, class: &'static str) -> Router<AppState> {
    Router::new()
        .route(
            &format!("/{endpoint}"),
            get(move |state: State<AppState>, _app: AppId, params: Query<FindParams>| {
                find(state, class.to_string(), params)
            })
            .post(move |state: State<AppState>, _app: AppId, body: Bytes| {
                create(state, class.to_string(), body)
            }),
        )
        .route(
            &format!("/{endpoint}/{{object_id}}"),
            get(move |state: State<AppState>, _app: AppId, Path(id): Path<String>| {
                fetch(state, class.to_string(), id)
            })
            .put(
                move |state: State<AppState>, _app: AppId, Path(id): Path<String>, body: Bytes| {
                    update(state, class.to_string(), id, body)
                },
            )
            .delete(move |state: State<AppState>, _app: AppId, Path(id): Path<String>| {
                remove(state, class.to_string(), id)
            }),
        )
}

/// GET - List objects of a class.
async fn find(
    State(state): State<AppState>,
    class: String,
    Query(params): Query<FindParams>,
) -> Result<Json<Value>> {
    Ok(Json(find_objects(&state.store, &class, &params)?))
}

/// POST - Create an object.
async fn create(
    State(state): State<AppState>,
    class: String,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let body = parse_body(&body)?;
    let (status, response) = create_object(&state.store, &class, &body)?;
    Ok((status, Json(response)))
}

/// GET - Fetch one object.
async fn fetch(State(state): State<AppState>, class: String, id: String) -> Result<Json<Value>> {
    Ok(Json(get_object(&state.store, &class, &id)?))
}

/// PUT - Apply changes to an object.
async fn update(
    State(state): State<AppState>,
    class: String,
    id: String,
    body: Bytes,
) -> Result<Json<Value>> {
    let body = parse_body(&body)?;
    Ok(Json(update_object(&state.store, &class, &id, &body)?))
}

/// DELETE - Remove an object.
async fn remove(State(state): State<AppState>, class: String, id: String) -> Result<Json<Value>> {
    Ok(Json(delete_object(&state.store, &class, &id)?))
}
