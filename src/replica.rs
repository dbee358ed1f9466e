use crate::model::{Enrollee, EntityId, Payment, Record, Schedule};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// The replica already holds this version or a newer one, or a newer
    /// delete tombstone exists for the id.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Absent,
    Stale,
}

/// One collection of the replica: id → entity, plus delete tombstones.
///
/// Versioned writes only land when they are newer than what is held for the
/// id, deletes included. Unversioned writes are applied unconditionally.
#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: HashMap<EntityId, T>,
    tombstones: HashMap<EntityId, u64>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            tombstones: HashMap::new(),
        }
    }
}

impl<T: Record> Table<T> {
    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.rows.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    /// Owned copy of every row, unordered.
    pub fn snapshot(&self) -> Vec<T> {
        self.rows.values().cloned().collect()
    }

    pub fn tombstone(&self, id: &EntityId) -> Option<u64> {
        self.tombstones.get(id).copied()
    }

    fn is_stale(&self, id: &EntityId, incoming: u64) -> bool {
        if let Some(dead) = self.tombstones.get(id) {
            if incoming <= *dead {
                return true;
            }
        }
        matches!(
            self.rows.get(id).and_then(|r| r.version()),
            Some(current) if incoming <= current
        )
    }

    pub(crate) fn upsert(&mut self, row: T) -> UpsertOutcome {
        let id = row.id().clone();
        if let Some(v) = row.version() {
            if self.is_stale(&id, v) {
                return UpsertOutcome::Stale;
            }
        }
        self.tombstones.remove(&id);
        match self.rows.insert(id, row) {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        }
    }

    pub(crate) fn remove(&mut self, id: &EntityId, version: Option<u64>) -> RemoveOutcome {
        let Some(v) = version else {
            return match self.rows.remove(id) {
                Some(_) => RemoveOutcome::Removed,
                None => RemoveOutcome::Absent,
            };
        };
        if let Some(current) = self.rows.get(id).and_then(|r| r.version()) {
            if v < current {
                return RemoveOutcome::Stale;
            }
        }
        let dead = self.tombstones.entry(id.clone()).or_insert(v);
        *dead = (*dead).max(v);
        match self.rows.remove(id) {
            Some(_) => RemoveOutcome::Removed,
            None => RemoveOutcome::Absent,
        }
    }

    /// Replaces the rows with a full fetch. Fetched rows that a newer
    /// tombstone already covers stay dead.
    ///
    /// Versions come from one increasing sequence, so the fetch reflects the
    /// remote at least as of its highest row version. Tombstones at or below
    /// that watermark are dropped unless they just suppressed a fetched row.
    pub(crate) fn replace_all(&mut self, rows: Vec<T>) {
        let watermark = rows.iter().filter_map(|r| r.version()).max();
        let mut next = HashMap::with_capacity(rows.len());
        let mut suppressed = Vec::new();
        for row in rows {
            let dead = match (row.version(), self.tombstones.get(row.id())) {
                (Some(v), Some(t)) => v <= *t,
                _ => false,
            };
            if dead {
                suppressed.push(row.id().clone());
            } else {
                next.insert(row.id().clone(), row);
            }
        }
        self.rows = next;
        if let Some(watermark) = watermark {
            self.tombstones
                .retain(|id, dead| *dead > watermark || suppressed.contains(id));
        }
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }
}

/// Client-resident mirror of the three remote collections.
///
/// Read access is public; every mutation goes through the reconciler.
#[derive(Debug, Clone, Default)]
pub struct Replica {
    enrollees: Table<Enrollee>,
    payments: Table<Payment>,
    schedules: Table<Schedule>,
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enrollees(&self) -> &Table<Enrollee> {
        &self.enrollees
    }

    pub fn payments(&self) -> &Table<Payment> {
        &self.payments
    }

    pub fn schedules(&self) -> &Table<Schedule> {
        &self.schedules
    }

    pub(crate) fn enrollees_mut(&mut self) -> &mut Table<Enrollee> {
        &mut self.enrollees
    }

    pub(crate) fn payments_mut(&mut self) -> &mut Table<Payment> {
        &mut self.payments
    }

    pub(crate) fn schedules_mut(&mut self) -> &mut Table<Schedule> {
        &mut self.schedules
    }
}
