//! Interpretation of server responses.
//!
//! Every round-trip ends here: transport failures and error statuses become
//! [`Error`]s, successful bodies are parsed into a [`ServerState`] that is
//! fully validated before any record is touched. A record therefore either
//! takes the whole server state or stays exactly as it was.

use crate::encode::{decode, decode_date};
use crate::error::{codes, Result};
use crate::transport::{Response, TransportError};
use crate::{Error, Record, Registry, Value};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

pub(crate) const ERR_INVALID_RESPONSE: &str = "Invalid response from backend.";
pub(crate) const ERR_PROCESSING_RESPONSE: &str =
    "An error occurred while processing response from server.";

/// Object state reported by the server, decoded but not yet applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ServerState {
    pub object_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub fields: BTreeMap<String, Value>,
}

impl ServerState {
    /// Decode a response object. Reserved keys go to their own attributes.
    pub fn parse(map: &Map<String, JsonValue>, registry: &Registry) -> Result<Self> {
        let mut state = ServerState::default();
        for (key, value) in map {
            match key.as_str() {
                "objectId" => {
                    let id = value.as_str().ok_or_else(|| {
                        Error::InvalidJson(format!("objectId must be a string, got {value}"))
                    })?;
                    state.object_id = Some(id.to_string());
                }
                "createdAt" => state.created_at = Some(decode_date(value)?),
                "updatedAt" => state.updated_at = Some(decode_date(value)?),
                _ => {
                    state.fields.insert(key.clone(), decode(value, registry)?);
                }
            }
        }
        Ok(state)
    }

    /// Reject a state naming a different object than `record`.
    pub fn check_identity(&self, record: &Record) -> Result<()> {
        match (&self.object_id, record.object_id()) {
            (Some(reported), Some(known)) if reported != known => {
                Err(Error::InvalidJson(format!(
                    "server answered for {} object {reported} but the request was for {known}",
                    record.class_name()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Like [`check_identity`](Self::check_identity), and a create must
    /// come back with an id.
    pub fn check_created(&self, record: &Record) -> Result<()> {
        if self.object_id.is_none() {
            return Err(Error::InvalidJson(format!(
                "server did not assign an objectId to the new {} object",
                record.class_name()
            )));
        }
        self.check_identity(record)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    error: Option<String>,
}

/// Build an error from a backend error body `{"code": n, "error": "..."}`.
pub(crate) fn error_from_body(body: &JsonValue) -> Option<Error> {
    let parsed = ErrorBody::deserialize(body).ok()?;
    if parsed.code.is_none() && parsed.error.is_none() {
        return None;
    }
    Some(Error::server(
        parsed.code.unwrap_or(codes::OTHER_CAUSE),
        parsed.error.unwrap_or_else(|| ERR_PROCESSING_RESPONSE.into()),
    ))
}

/// Turn a transport outcome into the parsed body of a successful response.
///
/// `Ok(None)` means the server confirmed the request with an empty body.
pub(crate) fn interpret(
    outcome: std::result::Result<Response, TransportError>,
) -> Result<Option<JsonValue>> {
    let response = outcome.map_err(|e| Error::ConnectionFailed(e.to_string()))?;
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();

    if !response.is_success() {
        if text.is_empty() {
            return Err(Error::ConnectionFailed(format!(
                "request failed with status {}",
                response.status
            )));
        }
        let body: JsonValue = serde_json::from_str(text)
            .map_err(|_| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))?;
        return Err(error_from_body(&body).unwrap_or_else(|| {
            Error::server(
                codes::OTHER_CAUSE,
                format!("request failed with status {}", response.status),
            )
        }));
    }

    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|_| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))
}

/// Require a JSON object body.
pub(crate) fn expect_object(body: JsonValue) -> Result<Map<String, JsonValue>> {
    match body {
        JsonValue::Object(map) => Ok(map),
        _ => Err(Error::InvalidJson(ERR_INVALID_RESPONSE.into())),
    }
}
