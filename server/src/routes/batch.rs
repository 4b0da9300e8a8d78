//! Batch endpoint route.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde_json::Value;

use crate::auth::AppId;
use crate::error::Result;
use crate::handlers::run_batch;
use crate::AppState;

/// Create batch routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/batch", post(batch_handler))
}

/// POST /batch - Run many object requests in one call.
async fn batch_handler(
    State(state): State<AppState>,
    _app: AppId,
    body: Bytes,
) -> Result<Json<Value>> {
    let results = run_batch(&state.store, &state.config.mount_path, &body)?;
    Ok(Json(results))
}
