//! Snapshot types for persisting and restoring records.
//!
//! A snapshot captures a clean record (no pending operations) so it can be
//! cached on disk and restored later without a round-trip. Fields are kept
//! in their full wire encoding, nested objects embedded, and stored in a
//! BTreeMap so serialization is deterministic.

use crate::encode::{decode, encode, format_date, parse_date, ObjectEncoding};
use crate::error::Result;
use crate::reconcile::ServerState;
use crate::{Error, Record, Registry};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const ERR_DIRTY: &str = "A dirty object cannot be serialized to storage";

/// A point-in-time copy of a clean record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    pub class_name: String,
    /// REST path the record was loaded from
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Field values in wire form
    pub fields: BTreeMap<String, JsonValue>,
}

impl RecordSnapshot {
    /// Capture `record`. Fails for records with pending changes.
    pub fn capture(record: &Record) -> Result<Self> {
        if record.is_dirty() {
            return Err(Error::OperationForbidden(ERR_DIRTY.into()));
        }
        let mut fields = BTreeMap::new();
        for (key, value) in record.fields() {
            fields.insert(key.clone(), encode(value, ObjectEncoding::Full)?);
        }
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            class_name: record.class_name().to_string(),
            endpoint: record.endpoint().to_string(),
            object_id: record.object_id().map(str::to_string),
            created_at: record.created_at().map(format_date),
            updated_at: record.updated_at().map(format_date),
            fields,
        })
    }

    /// Rebuild a record.
    pub fn restore(&self, registry: &Registry) -> Result<Record> {
        let mut record = Record::new(&self.class_name).with_endpoint(&self.endpoint);
        self.restore_into(&mut record, registry)?;
        Ok(record)
    }

    /// Overwrite `record` with the snapshot. Fails for records with pending
    /// changes, which would otherwise be lost.
    pub fn restore_into(&self, record: &mut Record, registry: &Registry) -> Result<()> {
        if record.is_dirty() {
            return Err(Error::OperationForbidden(ERR_DIRTY.into()));
        }
        if record.class_name() != self.class_name {
            return Err(Error::InvalidArgument(format!(
                "snapshot of {} cannot be restored into a {} object",
                self.class_name,
                record.class_name()
            )));
        }
        let mut state = ServerState {
            object_id: self.object_id.clone(),
            created_at: self.created_at.as_deref().map(parse_date).transpose()?,
            updated_at: self.updated_at.as_deref().map(parse_date).transpose()?,
            fields: BTreeMap::new(),
        };
        for (key, value) in &self.fields {
            state.fields.insert(key.clone(), decode(value, registry)?);
        }
        state.check_identity(record)?;
        record.absorb(state, true);
        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidJson(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidJson(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidJson(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidJson(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}
