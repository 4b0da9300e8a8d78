//! Application id extraction.
//!
//! When the server is configured with an application id, every API request
//! must present it in `X-Parse-Application-Id`. Otherwise any value (or none)
//! is accepted.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::AppState;

pub const APPLICATION_ID_HEADER: &str = "x-parse-application-id";

/// Application id presented by the caller.
#[derive(Debug, Clone)]
pub struct AppId(pub Option<String>);

impl FromRequestParts<AppState> for AppId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(APPLICATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match (&state.config.application_id, presented) {
            (None, presented) => Ok(AppId(presented)),
            (Some(expected), Some(presented)) if *expected == presented => {
                Ok(AppId(Some(presented)))
            }
            (Some(_), _) => Err(AppError::Unauthorized),
        }
    }
}
