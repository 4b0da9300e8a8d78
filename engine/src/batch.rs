//! Batched create/update/delete.
//!
//! A [`Batch`] borrows each record it carries for its whole lifetime, sends
//! all of their changes in one request and reconciles every record with its
//! own result. Items succeed or fail individually.

use crate::error::Result;
use crate::reconcile::{error_from_body, ServerState, ERR_INVALID_RESPONSE};
use crate::transport::{Method, ProgressCallback, Request};
use crate::{Error, Record, Registry, Synchronizer};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::fmt;

/// What to do with a record in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOp {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
struct SubRequest {
    method: Method,
    path: String,
    body: JsonValue,
}

struct Item<'a> {
    record: &'a mut Record,
    op: BatchOp,
    request: SubRequest,
}

enum Outcome {
    Success(ServerState),
    Failure(Error),
}

/// Per-record results of an executed batch, keyed by local identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchErrors {
    entries: Vec<(String, Option<Error>)>,
}

impl BatchErrors {
    /// The error for `record`, or `None` if it succeeded or was not part of
    /// the batch.
    pub fn get(&self, record: &Record) -> Option<&Error> {
        self.entries
            .iter()
            .find(|(local_id, _)| local_id == record.local_id())
            .and_then(|(_, error)| error.as_ref())
    }

    /// Whether `record` was part of the batch.
    pub fn contains(&self, record: &Record) -> bool {
        self.entries
            .iter()
            .any(|(local_id, _)| local_id == record.local_id())
    }

    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|(_, e)| e.is_some()).count()
    }

    /// Local ids and errors of the failed items, in batch order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.entries
            .iter()
            .filter_map(|(local_id, error)| error.as_ref().map(|e| (local_id.as_str(), e)))
    }
}

pub struct Batch<'a> {
    path_prefix: String,
    items: Vec<Item<'a>>,
    outcomes: Option<BatchErrors>,
    succeeded: bool,
    progress: Option<ProgressCallback>,
}

impl<'a> Batch<'a> {
    /// An empty batch. `path_prefix` is the absolute path of the API root.
    pub fn new(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into().trim_end_matches('/').to_string(),
            items: Vec::new(),
            outcomes: None,
            succeeded: false,
            progress: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn set_progress_callback(&mut self, progress: ProgressCallback) {
        self.progress = Some(progress);
    }

    pub fn add_object(&mut self, record: &'a mut Record, op: BatchOp) -> Result<()> {
        self.add_objects([record], op)
    }

    /// Queue records. Nothing is queued unless every record qualifies.
    pub fn add_objects(
        &mut self,
        records: impl IntoIterator<Item = &'a mut Record>,
        op: BatchOp,
    ) -> Result<()> {
        let mut prepared = Vec::new();
        for record in records {
            let request = self.sub_request(record, op)?;
            prepared.push(Item {
                record,
                op,
                request,
            });
        }
        self.items.extend(prepared);
        self.outcomes = None;
        self.succeeded = false;
        Ok(())
    }

    fn sub_request(&self, record: &Record, op: BatchOp) -> Result<SubRequest> {
        let absolute = |path: &str| format!("{}/{path}", self.path_prefix);
        match (op, record.object_path()) {
            (BatchOp::Create, None) => Ok(SubRequest {
                method: Method::Post,
                path: absolute(record.endpoint()),
                body: JsonValue::Object(record.pending_payload()?),
            }),
            (BatchOp::Create, Some(_)) => Err(Error::OperationForbidden(
                "Cannot create an object already having an objectId.".into(),
            )),
            (BatchOp::Update, Some(path)) => Ok(SubRequest {
                method: Method::Put,
                path: absolute(&path),
                body: JsonValue::Object(record.pending_payload()?),
            }),
            (BatchOp::Delete, Some(path)) => Ok(SubRequest {
                method: Method::Delete,
                path: absolute(&path),
                body: json!({}),
            }),
            (BatchOp::Update | BatchOp::Delete, None) => Err(Error::OperationForbidden(
                "Cannot update or delete an object without an objectId.".into(),
            )),
        }
    }

    /// Send the batch. Returns `true` when every item succeeded.
    ///
    /// An error means the batch as a whole failed (transport failure or an
    /// unusable response) and no record was changed.
    pub fn execute(&mut self, sync: &Synchronizer) -> Result<bool> {
        self.outcomes = None;
        self.succeeded = false;

        let requests: Vec<&SubRequest> = self.items.iter().map(|item| &item.request).collect();
        let body = json!({ "requests": requests });
        let request = Request::post("batch", body).with_progress(self.progress.clone());

        let entries = match sync.perform(&request)? {
            Some(JsonValue::Array(entries)) => entries,
            _ => return Err(Error::InvalidJson(ERR_INVALID_RESPONSE.into())),
        };
        if entries.len() != self.items.len() {
            return Err(Error::InvalidJson(format!(
                "Incorrect batch result count. Expected {} results but found {}",
                self.items.len(),
                entries.len()
            )));
        }

        let outcomes = entries
            .iter()
            .zip(&self.items)
            .enumerate()
            .map(|(index, (entry, item))| parse_entry(index, entry, item, sync.registry()))
            .collect::<Result<Vec<_>>>()?;

        let mut results = BatchErrors::default();
        for (item, outcome) in self.items.iter_mut().zip(outcomes) {
            let error = match outcome {
                Outcome::Success(state) => {
                    match item.op {
                        BatchOp::Delete => item.record.reset(),
                        BatchOp::Create | BatchOp::Update => item.record.absorb(state, false),
                    }
                    None
                }
                Outcome::Failure(error) => Some(error),
            };
            results
                .entries
                .push((item.record.local_id().to_string(), error));
        }

        self.succeeded = results.failure_count() == 0;
        tracing::debug!(
            items = results.len(),
            failures = results.failure_count(),
            "batch executed"
        );
        self.outcomes = Some(results);
        Ok(self.succeeded)
    }

    /// True after an execute in which every item succeeded.
    pub fn is_succeeded(&self) -> bool {
        self.succeeded
    }

    /// Per-record results of the last execute.
    pub fn errors(&self) -> Result<BatchErrors> {
        self.outcomes
            .clone()
            .ok_or_else(|| Error::OperationForbidden("The batch must first be executed".into()))
    }
}

fn parse_entry(
    index: usize,
    entry: &JsonValue,
    item: &Item<'_>,
    registry: &Registry,
) -> Result<Outcome> {
    if let Some(success) = entry.get("success") {
        let state = match success {
            JsonValue::Object(map) => ServerState::parse(map, registry)?,
            JsonValue::Null => ServerState::default(),
            _ => return Err(Error::InvalidJson(ERR_INVALID_RESPONSE.into())),
        };
        match item.op {
            BatchOp::Create => state.check_created(&*item.record)?,
            BatchOp::Update | BatchOp::Delete => state.check_identity(&*item.record)?,
        }
        return Ok(Outcome::Success(state));
    }
    if let Some(error) = entry.get("error") {
        return error_from_body(error)
            .map(Outcome::Failure)
            .ok_or_else(|| Error::InvalidJson(ERR_INVALID_RESPONSE.into()));
    }
    Err(Error::InvalidJson(format!(
        "Batch result at index {index} has neither a success nor an error field"
    )))
}

impl fmt::Debug for Batch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requests: Vec<_> = self.items.iter().map(|item| &item.request).collect();
        f.debug_struct("Batch")
            .field("path_prefix", &self.path_prefix)
            .field("requests", &requests)
            .field("succeeded", &self.succeeded)
            .finish_non_exhaustive()
    }
}
