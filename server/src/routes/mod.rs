//! HTTP route definitions.

mod batch;
mod classes;
mod health;

use crate::AppState;
use axum::Router;

/// Routes of the REST API, mounted under the configured path.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(classes::routes()).merge(batch::routes())
}

/// Create all application routes.
pub fn create_routes(mount_path: &str) -> Router<AppState> {
    let router = Router::new().merge(health::routes());
    if mount_path.is_empty() {
        router.merge(api_routes())
    } else {
        router.nest(mount_path, api_routes())
    }
}
