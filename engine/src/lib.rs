//! # Nimbus Engine
//!
//! Mutation tracking and synchronization for records stored in a
//! backend-as-a-service REST API.
//!
//! Application code works with local [`Record`]s. Each change is captured as
//! a [`FieldOperation`] and only the pending operations are sent on save, so
//! increments, array edits and relation edits made by different clients
//! compose on the server instead of overwriting each other.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine speaks to the network through the [`Transport`] trait
//! - **No partial updates**: a failed round-trip leaves every record untouched,
//!   so retrying sends the same changes again
//! - **Blocking**: one call, at most one round-trip; no background work
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A record has:
//! - A class name and the REST endpoint of that class
//! - An optional server-assigned object id and timestamps
//! - A field map of [`Value`]s
//! - Pending operations keyed by field; a record is dirty while any exist
//!
//! ### Operations
//!
//! Mutations are expressed as operations, not direct writes:
//! - [`FieldOperation::Set`] / [`FieldOperation::Delete`]
//! - [`FieldOperation::Increment`] - numeric add, widening as needed
//! - [`FieldOperation::Add`], [`FieldOperation::AddUnique`],
//!   [`FieldOperation::Remove`] - array edits
//! - [`FieldOperation::Relation`] - relation membership edits
//!
//! ### Synchronization
//!
//! The [`Synchronizer`] saves, deletes and fetches records and runs
//! [`Query`]s. A [`Batch`] sends many creates, updates and deletes in one
//! request and reports per-record outcomes.
//!
//! ## Quick Start
//!
//! ```rust
//! use nimbus_engine::{MockTransport, Record, Synchronizer};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! // 1. Wire a synchronizer to a transport
//! let transport = Arc::new(MockTransport::new());
//! let sync = Synchronizer::new(transport.clone());
//!
//! // 2. Build a record
//! let mut score = Record::new("GameScore");
//! score.put("player", "Sean Plott").unwrap();
//! score.put("score", 1337i32).unwrap();
//! assert!(score.is_dirty());
//!
//! // 3. Save it
//! transport.push_json(201, json!({
//!     "objectId": "Ed1nuqPvcm",
//!     "createdAt": "2024-01-31T12:00:00.000Z"
//! }));
//! score.save(&sync).unwrap();
//! assert_eq!(score.object_id(), Some("Ed1nuqPvcm"));
//! assert!(!score.is_dirty());
//!
//! // 4. Later changes send only the delta
//! score.increment("score").unwrap();
//! let payload = score.pending_payload().unwrap();
//! assert_eq!(payload["score"], json!({"__op": "Increment", "amount": 1}));
//! ```
//!
//! ## Persistence
//!
//! Use [`RecordSnapshot::capture`] and [`RecordSnapshot::restore`] to cache
//! clean records. Snapshots serialize to JSON with deterministic ordering.

pub mod batch;
pub mod encode;
pub mod error;
pub mod operation;
pub mod query;
mod reconcile;
pub mod record;
pub mod registry;
pub mod relation;
pub mod snapshot;
pub mod sync;
pub mod transport;
pub mod value;

// Re-export main types at crate root
pub use batch::{Batch, BatchErrors, BatchOp};
pub use error::{codes, Error, Result};
pub use operation::{FieldOperation, RelationChange};
pub use query::Query;
pub use record::{is_reserved_key, ObjectRef, Record, RESERVED_KEYS};
pub use registry::{Registry, RecordFactory};
pub use relation::{Relation, RelationHandle};
pub use snapshot::{RecordSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use sync::Synchronizer;
pub use transport::{
    Method, MockTransport, ProgressCallback, RecordedRequest, Request, Response, Transport,
    TransportError,
};
pub use value::{FileRef, GeoPoint, Number, Value};
