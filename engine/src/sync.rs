//! Save, delete and fetch orchestration.

use crate::error::Result;
use crate::reconcile::{expect_object, interpret, ServerState, ERR_INVALID_RESPONSE};
use crate::transport::{Request, Transport};
use crate::{Batch, Error, Query, Record, Registry};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;

/// Drives records through the backend.
///
/// Every call performs at most one blocking round-trip. On failure the
/// record is left exactly as it was, so retrying resends the same changes.
#[derive(Clone)]
pub struct Synchronizer {
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    path_prefix: String,
}

impl Synchronizer {
    /// A synchronizer with the default class registry.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: Arc::new(Registry::with_defaults()),
            path_prefix: String::new(),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Absolute path of the API root (for example `/1`). Batch sub-requests
    /// address objects by absolute path.
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Perform a request and interpret the outcome.
    pub(crate) fn perform(&self, request: &Request) -> Result<Option<JsonValue>> {
        let started = Instant::now();
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            body = ?request.body,
            "sending request"
        );
        let result = interpret(self.transport.perform(request));
        match &result {
            Ok(_) => tracing::debug!(
                method = %request.method,
                path = %request.path,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request succeeded"
            ),
            Err(e) => tracing::error!(
                method = %request.method,
                path = %request.path,
                code = e.code(),
                error = %e,
                "request failed"
            ),
        }
        result
    }

    fn perform_object(&self, request: &Request) -> Result<Option<Map<String, JsonValue>>> {
        self.perform(request)?.map(expect_object).transpose()
    }

    /// Send the pending changes of `record`.
    ///
    /// Creates the object when it has no id yet, updates it otherwise.
    /// A record without pending changes is left alone.
    pub fn save(&self, record: &mut Record) -> Result<()> {
        if !record.is_dirty() {
            tracing::warn!(
                class = %record.class_name(),
                object_id = ?record.object_id(),
                "ignoring save of an unchanged object"
            );
            return Ok(());
        }
        let body = JsonValue::Object(record.pending_payload()?);
        let is_create = record.object_id().is_none();
        let request = match record.object_path() {
            Some(path) => Request::put(path, body),
            None => Request::post(record.endpoint(), body),
        };

        let state = match self.perform_object(&request)? {
            Some(map) => ServerState::parse(&map, &self.registry)?,
            None => ServerState::default(),
        };
        if is_create {
            state.check_created(record)?;
        } else {
            state.check_identity(record)?;
        }
        record.absorb(state, false);
        Ok(())
    }

    /// Delete the object on the server and reset `record` to the
    /// never-saved state. Records without an id are left alone.
    pub fn delete(&self, record: &mut Record) -> Result<()> {
        let Some(path) = record.object_path() else {
            return Ok(());
        };
        self.perform(&Request::delete(path))?;
        record.reset();
        Ok(())
    }

    /// Replace the record's fields with the server's copy, discarding any
    /// pending changes.
    pub fn fetch(&self, record: &mut Record) -> Result<()> {
        let path = record.object_path().ok_or_else(|| {
            Error::MissingObjectId(format!(
                "cannot fetch an unsaved {} object",
                record.class_name()
            ))
        })?;
        let map = self
            .perform_object(&Request::get(path))?
            .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))?;
        let state = ServerState::parse(&map, &self.registry)?;
        state.check_identity(record)?;
        record.absorb(state, true);
        Ok(())
    }

    /// Fetch only if the record holds no data and has no pending changes.
    pub fn fetch_if_needed(&self, record: &mut Record) -> Result<()> {
        if record.is_data_available() || record.is_dirty() {
            return Ok(());
        }
        self.fetch(record)
    }

    /// Retrieve an object by class and id.
    pub fn get(&self, class_name: &str, object_id: &str) -> Result<Record> {
        let mut record = self.registry.create_without_data(class_name, object_id);
        self.fetch(&mut record)?;
        Ok(record)
    }

    /// Records matching `query`.
    pub fn find(&self, query: &Query) -> Result<Vec<Record>> {
        let request = Request::get(self.query_path(query)).with_query(query.to_params(false)?);
        let map = self
            .perform_object(&request)?
            .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))?;

        let class_name = map
            .get("className")
            .and_then(JsonValue::as_str)
            .unwrap_or(query.class_name());
        let results = map
            .get("results")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))?;

        results
            .iter()
            .map(|item| -> Result<Record> {
                let item = item
                    .as_object()
                    .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))?;
                let state = ServerState::parse(item, &self.registry)?;
                let mut record = self.registry.create(class_name);
                record.absorb(state, true);
                Ok(record)
            })
            .collect()
    }

    /// First record matching `query`, if any.
    pub fn first(&self, query: &Query) -> Result<Option<Record>> {
        let query = query.clone().limit(1);
        Ok(self.find(&query)?.into_iter().next())
    }

    /// Number of records matching `query`.
    pub fn count(&self, query: &Query) -> Result<u64> {
        let request = Request::get(self.query_path(query)).with_query(query.to_params(true)?);
        let map = self
            .perform_object(&request)?
            .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))?;
        map.get("count")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()))
    }

    fn query_path(&self, query: &Query) -> String {
        self.registry.create(query.class_name()).endpoint().to_string()
    }

    /// Start a batch addressed at this synchronizer's API root.
    pub fn batch<'a>(&self) -> Batch<'a> {
        Batch::new(self.path_prefix.clone())
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("registry", &self.registry)
            .field("path_prefix", &self.path_prefix)
            .finish_non_exhaustive()
    }
}
