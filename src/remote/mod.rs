//! Interface to the authoritative store.
//!
//! The replica engine only ever sees this trait: bulk fetch, one change feed
//! per collection, and plain insert/update/delete requests. Records cross the
//! boundary as wire-shaped JSON objects.

pub mod sqlite;

use crate::model::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::Sender;
use thiserror::Error;

pub use sqlite::SqliteRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Enrollees,
    Payments,
    Schedules,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Enrollees,
        Collection::Payments,
        Collection::Schedules,
    ];

    /// Table name on the remote side.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Enrollees => "students",
            Collection::Payments => "payments",
            Collection::Schedules => "schedules",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// One change notification. `record` is the full wire snapshot for
/// inserts/updates and at least `{ "id": … }` for deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl ChangeEvent {
    /// The event's own version, or the one carried inside the record.
    pub fn effective_version(&self) -> Option<u64> {
        self.version
            .or_else(|| self.record.get("version").and_then(|v| v.as_u64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub collection: Collection,
    pub id: u64,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: EntityId },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<rusqlite::Error> for RemoteError {
    fn from(value: rusqlite::Error) -> Self {
        RemoteError::Transport(value.to_string())
    }
}

/// Capabilities consumed from the authoritative store, per collection.
///
/// Writes return the persisted record; they never touch the replica. The
/// replica learns about them through the change feed like any other change.
pub trait RemoteStore {
    fn fetch_all(&mut self, collection: Collection) -> Result<Vec<serde_json::Value>, RemoteError>;

    /// Registers `sink` for change events on `collection`.
    fn subscribe(
        &mut self,
        collection: Collection,
        sink: Sender<ChangeEvent>,
    ) -> Result<SubscriptionHandle, RemoteError>;

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), RemoteError>;

    fn insert(
        &mut self,
        collection: Collection,
        record: serde_json::Value,
    ) -> Result<serde_json::Value, RemoteError>;

    /// Applies the fields present in `patch` to the record with `id`.
    fn update(
        &mut self,
        collection: Collection,
        id: &EntityId,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value, RemoteError>;

    fn delete(&mut self, collection: Collection, id: &EntityId) -> Result<(), RemoteError>;
}
