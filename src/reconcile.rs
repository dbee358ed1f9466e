//! Merges change events and bulk loads into the replica.
//!
//! This is the only code allowed to mutate a [`Replica`]. Inserts and
//! updates are both upserts by id, so redelivery is harmless; deletes of
//! absent ids are no-ops. Versioned events that are not newer than what the
//! replica holds for the id are discarded, which keeps a late update from
//! resurrecting a deleted entity.

use crate::model::{EntityId, Record};
use crate::normalize::normalize_schedule;
use crate::remote::{ChangeEvent, ChangeKind, Collection};
use crate::replica::{RemoveOutcome, Replica, Table, UpsertOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    /// Delete of an id the replica does not hold.
    Absent,
    Stale,
    /// Missing identity or unparseable payload; logged and dropped.
    Malformed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub upserted: usize,
    pub removed: usize,
    pub ignored: usize,
    pub malformed: usize,
}

impl ApplyReport {
    pub fn record(&mut self, applied: Applied) {
        match applied {
            Applied::Inserted | Applied::Replaced => self.upserted += 1,
            Applied::Removed => self.removed += 1,
            Applied::Absent | Applied::Stale => self.ignored += 1,
            Applied::Malformed => self.malformed += 1,
        }
    }

    pub fn merge(&mut self, other: ApplyReport) {
        self.upserted += other.upserted;
        self.removed += other.removed;
        self.ignored += other.ignored;
        self.malformed += other.malformed;
    }

    pub fn total(&self) -> usize {
        self.upserted + self.removed + self.ignored + self.malformed
    }
}

/// Translates a wire record into the replica's canonical shape.
pub fn canonical_record(collection: Collection, record: Value) -> Value {
    match collection {
        Collection::Schedules => normalize_schedule(record),
        Collection::Enrollees | Collection::Payments => record,
    }
}

fn parse_row<T: DeserializeOwned + Record>(
    collection: Collection,
    record: Value,
    version: Option<u64>,
) -> Option<T> {
    let canonical = canonical_record(collection, record);
    match serde_json::from_value::<T>(canonical) {
        Ok(row) => Some(with_version(row, version)),
        Err(e) => {
            warn!(%collection, error = %e, "dropping unparseable record");
            None
        }
    }
}

// Event-level versions win over whatever the record body carries.
fn with_version<T: Record>(mut row: T, version: Option<u64>) -> T {
    if let Some(v) = version {
        row.set_version(v);
    }
    row
}

fn apply_to<T: DeserializeOwned + Record>(
    table: &mut Table<T>,
    collection: Collection,
    event: ChangeEvent,
) -> Applied {
    let version = event.effective_version();
    let Some(id) = EntityId::from_record(&event.record) else {
        warn!(%collection, kind = ?event.kind, "dropping change event without id");
        return Applied::Malformed;
    };

    let applied = match event.kind {
        ChangeKind::Inserted | ChangeKind::Updated => {
            let Some(row) = parse_row::<T>(collection, event.record, version) else {
                return Applied::Malformed;
            };
            match table.upsert(row) {
                UpsertOutcome::Inserted => Applied::Inserted,
                UpsertOutcome::Replaced => Applied::Replaced,
                UpsertOutcome::Stale => Applied::Stale,
            }
        }
        ChangeKind::Deleted => match table.remove(&id, version) {
            RemoveOutcome::Removed => Applied::Removed,
            RemoveOutcome::Absent => Applied::Absent,
            RemoveOutcome::Stale => Applied::Stale,
        },
    };
    debug!(%collection, %id, kind = ?event.kind, ?version, ?applied, "change applied");
    applied
}

/// Applies one change event to the matching collection.
pub fn apply_event(replica: &mut Replica, collection: Collection, event: ChangeEvent) -> Applied {
    match collection {
        Collection::Enrollees => apply_to(replica.enrollees_mut(), collection, event),
        Collection::Payments => apply_to(replica.payments_mut(), collection, event),
        Collection::Schedules => apply_to(replica.schedules_mut(), collection, event),
    }
}

fn parse_rows<T: DeserializeOwned + Record>(collection: Collection, records: Vec<Value>) -> (Vec<T>, usize) {
    let mut rows = Vec::with_capacity(records.len());
    let mut malformed = 0;
    for record in records {
        if EntityId::from_record(&record).is_none() {
            warn!(%collection, "dropping fetched record without id");
            malformed += 1;
            continue;
        }
        match parse_row::<T>(collection, record, None) {
            Some(row) => rows.push(row),
            None => malformed += 1,
        }
    }
    (rows, malformed)
}

/// Replaces one collection with the result of a full fetch.
pub fn load_collection(replica: &mut Replica, collection: Collection, records: Vec<Value>) -> ApplyReport {
    fn load<T: DeserializeOwned + Record>(
        table: &mut Table<T>,
        collection: Collection,
        records: Vec<Value>,
    ) -> ApplyReport {
        let (rows, malformed) = parse_rows::<T>(collection, records);
        let upserted = rows.len();
        table.replace_all(rows);
        ApplyReport {
            upserted,
            malformed,
            ..ApplyReport::default()
        }
    }

    match collection {
        Collection::Enrollees => load(replica.enrollees_mut(), collection, records),
        Collection::Payments => load(replica.payments_mut(), collection, records),
        Collection::Schedules => load(replica.schedules_mut(), collection, records),
    }
}
