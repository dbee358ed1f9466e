use super::{ChangeEvent, ChangeKind, Collection, RemoteError, RemoteStore, SubscriptionHandle};
use crate::model::{parse_wire_date, EntityId};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, info};
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "studio.sqlite3";

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Text,
    Integer,
    Real,
    Flag,
    /// JSON array stored as text.
    TagList,
}

use ColumnKind::*;

// Every table also has `id TEXT PRIMARY KEY` and `version INTEGER NOT NULL`.
const STUDENT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("name", Text),
    ("last_name", Text),
    ("age", Integer),
    ("initial_weight", Real),
    ("pathology", Text),
    ("schedule", Text),
    ("schedule_id", Text),
    ("is_active", Flag),
    ("created_at", Text),
    ("contact", Text),
    ("emergency_contact", Text),
    ("medical_assistance", Text),
    ("modality", Text),
    ("photo_url", Text),
];

const PAYMENT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("student_id", Text),
    ("amount", Real),
    ("payment_date", Text),
    ("current_weight", Real),
];

const SCHEDULE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("name", Text),
    ("days", TagList),
    ("start_time", Text),
    ("end_time", Text),
    ("max_capacity", Integer),
    ("description", Text),
];

fn columns(collection: Collection) -> &'static [(&'static str, ColumnKind)] {
    match collection {
        Collection::Enrollees => STUDENT_COLUMNS,
        Collection::Payments => PAYMENT_COLUMNS,
        Collection::Schedules => SCHEDULE_COLUMNS,
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            age INTEGER,
            initial_weight REAL,
            pathology TEXT,
            schedule TEXT,
            schedule_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            contact TEXT,
            emergency_contact TEXT,
            medical_assistance TEXT,
            modality TEXT,
            photo_url TEXT,
            version INTEGER NOT NULL
        )",
        [],
    )?;

    // No foreign key on student_id: payments may outlive the enrollee.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount REAL NOT NULL,
            payment_date TEXT NOT NULL,
            current_weight REAL,
            version INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student ON payments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedules(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            days TEXT NOT NULL DEFAULT '[]',
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            max_capacity INTEGER,
            description TEXT,
            version INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_sequence(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            value INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO sync_sequence(id, value) VALUES(1, 0)",
        [],
    )?;
    Ok(())
}

fn json_to_sql(name: &str, kind: ColumnKind, v: &Value) -> Result<SqlValue, RemoteError> {
    let bad = || RemoteError::Rejected(format!("invalid value for {}: {}", name, v));
    Ok(match (kind, v) {
        (_, Value::Null) => SqlValue::Null,
        (Text, Value::String(s)) => SqlValue::Text(s.clone()),
        (Text, Value::Number(n)) => SqlValue::Text(n.to_string()),
        (Integer, Value::Number(n)) => SqlValue::Integer(n.as_i64().ok_or_else(bad)?),
        (Integer, Value::String(s)) => SqlValue::Integer(s.trim().parse().map_err(|_| bad())?),
        (Real, Value::Number(n)) => SqlValue::Real(n.as_f64().ok_or_else(bad)?),
        (Real, Value::String(s)) => SqlValue::Real(s.trim().parse().map_err(|_| bad())?),
        (Flag, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (Flag, Value::Number(n)) => SqlValue::Integer(i64::from(n.as_i64() != Some(0))),
        (TagList, Value::Array(_)) => SqlValue::Text(v.to_string()),
        _ => return Err(bad()),
    })
}

fn sql_to_json(kind: ColumnKind, v: SqlValue) -> Value {
    match (kind, v) {
        (_, SqlValue::Null) => Value::Null,
        (Flag, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (TagList, SqlValue::Text(s)) => serde_json::from_str(&s).unwrap_or(Value::Null),
        (_, SqlValue::Text(s)) => Value::String(s),
        (_, SqlValue::Integer(i)) => json!(i),
        (_, SqlValue::Real(f)) => json!(f),
        (_, SqlValue::Blob(_)) => Value::Null,
    }
}

fn text_field<'a>(row: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    row.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Creation-time rules the remote enforces. The replica never re-validates.
fn validate(collection: Collection, row: &Map<String, Value>) -> Result<(), RemoteError> {
    match collection {
        Collection::Enrollees => {
            if text_field(row, "name").is_none() || text_field(row, "last_name").is_none() {
                return Err(RemoteError::Rejected(
                    "name/last_name must not be empty".to_string(),
                ));
            }
        }
        Collection::Payments => {
            if text_field(row, "student_id").is_none() {
                return Err(RemoteError::Rejected("missing student_id".to_string()));
            }
            let amount = row.get("amount").and_then(|v| v.as_f64());
            if !matches!(amount, Some(a) if a >= 0.0) {
                return Err(RemoteError::Rejected(
                    "amount must be a non-negative number".to_string(),
                ));
            }
            if text_field(row, "payment_date").and_then(parse_wire_date).is_none() {
                return Err(RemoteError::Rejected(
                    "payment_date must be YYYY-MM-DD".to_string(),
                ));
            }
        }
        Collection::Schedules => {
            let (Some(start), Some(end)) =
                (text_field(row, "start_time"), text_field(row, "end_time"))
            else {
                return Err(RemoteError::Rejected(
                    "start_time/end_time are required".to_string(),
                ));
            };
            // Zero-padded HH:MM[:SS] compares correctly as text.
            if start >= end {
                return Err(RemoteError::Rejected(
                    "start_time must be before end_time".to_string(),
                ));
            }
            if text_field(row, "name").is_none() {
                return Err(RemoteError::Rejected("name must not be empty".to_string()));
            }
        }
    }
    Ok(())
}

struct Subscriber {
    handle: SubscriptionHandle,
    sink: Sender<ChangeEvent>,
}

/// Authoritative store backed by SQLite.
///
/// Every write bumps a global sequence that becomes the record's `version`,
/// then publishes a change event to the collection's subscribers.
pub struct SqliteRemote {
    conn: Connection,
    path: Option<PathBuf>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl SqliteRemote {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = open_db(workspace)?;
        info!(workspace = %workspace.display(), "opened studio store");
        Ok(Self::with_connection(conn, Some(workspace.join(DB_FILE_NAME))))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::with_connection(conn, None))
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn,
            path,
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn select_sql(collection: Collection) -> String {
        let cols: Vec<&str> = columns(collection).iter().map(|(n, _)| *n).collect();
        format!(
            "SELECT id, {}, version FROM {}",
            cols.join(", "),
            collection.table()
        )
    }

    fn row_to_json(collection: Collection, r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
        let cols = columns(collection);
        let mut out = Map::new();
        out.insert("id".to_string(), Value::String(r.get::<_, String>(0)?));
        for (i, (name, kind)) in cols.iter().enumerate() {
            let raw: SqlValue = r.get(i + 1)?;
            out.insert((*name).to_string(), sql_to_json(*kind, raw));
        }
        out.insert("version".to_string(), json!(r.get::<_, i64>(cols.len() + 1)?));
        Ok(Value::Object(out))
    }

    fn load_one(&self, collection: Collection, id: &EntityId) -> Result<Option<Value>, RemoteError> {
        let sql = format!("{} WHERE id = ?", Self::select_sql(collection));
        let row = self
            .conn
            .query_row(&sql, [id.as_str()], |r| Self::row_to_json(collection, r))
            .optional()?;
        Ok(row)
    }

    fn publish(&mut self, collection: Collection, event: ChangeEvent) {
        self.subscribers.retain(|s| {
            if s.handle.collection != collection {
                return true;
            }
            // A dropped receiver means the subscriber went away without
            // unsubscribing.
            s.sink.send(event.clone()).is_ok()
        });
    }

    fn write_row(
        &mut self,
        collection: Collection,
        id: &EntityId,
        row: &Map<String, Value>,
        kind: ChangeKind,
    ) -> Result<Value, RemoteError> {
        validate(collection, row)?;
        let cols = columns(collection);
        let mut values: Vec<SqlValue> = Vec::with_capacity(cols.len() + 2);
        values.push(SqlValue::Text(id.as_str().to_string()));
        for (name, ck) in cols {
            values.push(json_to_sql(name, *ck, row.get(*name).unwrap_or(&Value::Null))?);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE sync_sequence SET value = value + 1 WHERE id = 1",
            [],
        )?;
        let version: i64 = tx.query_row("SELECT value FROM sync_sequence WHERE id = 1", [], |r| {
            r.get(0)
        })?;
        values.push(SqlValue::Integer(version));

        let names: Vec<&str> = cols.iter().map(|(n, _)| *n).collect();
        let placeholders = vec!["?"; names.len() + 2].join(", ");
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {}(id, {}, version) VALUES({})",
                collection.table(),
                names.join(", "),
                placeholders
            ),
            params_from_iter(values.iter()),
        )?;
        tx.commit()?;

        let saved = self
            .load_one(collection, id)?
            .ok_or_else(|| RemoteError::Transport("row vanished after write".to_string()))?;
        debug!(%collection, %id, version, ?kind, "remote write");
        self.publish(
            collection,
            ChangeEvent {
                kind,
                record: saved.clone(),
                version: Some(version as u64),
            },
        );
        Ok(saved)
    }
}

impl RemoteStore for SqliteRemote {
    fn fetch_all(&mut self, collection: Collection) -> Result<Vec<Value>, RemoteError> {
        let sql = format!("{} ORDER BY rowid", Self::select_sql(collection));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| Self::row_to_json(collection, r))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn subscribe(
        &mut self,
        collection: Collection,
        sink: Sender<ChangeEvent>,
    ) -> Result<SubscriptionHandle, RemoteError> {
        let handle = SubscriptionHandle {
            collection,
            id: self.next_subscription,
        };
        self.next_subscription += 1;
        self.subscribers.push(Subscriber { handle, sink });
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), RemoteError> {
        self.subscribers.retain(|s| s.handle != handle);
        Ok(())
    }

    fn insert(&mut self, collection: Collection, record: Value) -> Result<Value, RemoteError> {
        let Value::Object(fields) = record else {
            return Err(RemoteError::Rejected("record must be an object".to_string()));
        };
        let id = EntityId::from_record(&Value::Object(fields.clone()))
            .unwrap_or_else(|| EntityId::new(Uuid::new_v4().to_string()));
        if self.load_one(collection, &id)?.is_some() {
            return Err(RemoteError::Rejected(format!("{} {} already exists", collection, id)));
        }

        let mut row = Map::new();
        for (name, _) in columns(collection) {
            row.insert(
                (*name).to_string(),
                fields.get(*name).cloned().unwrap_or(Value::Null),
            );
        }
        if collection == Collection::Enrollees {
            if row.get("is_active").map_or(true, Value::is_null) {
                row.insert("is_active".to_string(), Value::Bool(true));
            }
            if row.get("created_at").map_or(true, Value::is_null) {
                row.insert(
                    "created_at".to_string(),
                    Value::String(chrono::Utc::now().to_rfc3339()),
                );
            }
        }
        if collection == Collection::Schedules && row.get("days").map_or(true, Value::is_null) {
            row.insert("days".to_string(), json!([]));
        }
        self.write_row(collection, &id, &row, ChangeKind::Inserted)
    }

    fn update(
        &mut self,
        collection: Collection,
        id: &EntityId,
        patch: Value,
    ) -> Result<Value, RemoteError> {
        let Value::Object(fields) = patch else {
            return Err(RemoteError::Rejected("patch must be an object".to_string()));
        };
        let Some(Value::Object(mut row)) = self.load_one(collection, id)? else {
            return Err(RemoteError::NotFound {
                collection,
                id: id.clone(),
            });
        };
        for (name, _) in columns(collection) {
            if let Some(v) = fields.get(*name) {
                row.insert((*name).to_string(), v.clone());
            }
        }
        self.write_row(collection, id, &row, ChangeKind::Updated)
    }

    fn delete(&mut self, collection: Collection, id: &EntityId) -> Result<(), RemoteError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE id = ?", collection.table()),
            [id.as_str()],
        )?;
        if removed == 0 {
            return Ok(());
        }
        tx.execute(
            "UPDATE sync_sequence SET value = value + 1 WHERE id = 1",
            [],
        )?;
        let version: i64 = tx.query_row("SELECT value FROM sync_sequence WHERE id = 1", [], |r| {
            r.get(0)
        })?;
        tx.commit()?;

        debug!(%collection, %id, version, "remote delete");
        self.publish(
            collection,
            ChangeEvent {
                kind: ChangeKind::Deleted,
                record: json!({ "id": id }),
                version: Some(version as u64),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn remote() -> SqliteRemote {
        SqliteRemote::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn insert_assigns_id_version_and_defaults() {
        let mut r = remote();
        let saved = r
            .insert(
                Collection::Enrollees,
                json!({ "name": "Ana", "last_name": "Ruiz" }),
            )
            .expect("insert");
        assert!(saved["id"].as_str().is_some());
        assert_eq!(saved["is_active"], json!(true));
        assert_eq!(saved["version"], json!(1));
        assert!(saved["created_at"].as_str().is_some());
    }

    #[test]
    fn versions_increase_across_collections() {
        let mut r = remote();
        let a = r
            .insert(Collection::Enrollees, json!({ "name": "A", "last_name": "B" }))
            .expect("insert enrollee");
        let p = r
            .insert(
                Collection::Payments,
                json!({ "student_id": a["id"], "amount": 100, "payment_date": "2024-01-31" }),
            )
            .expect("insert payment");
        assert!(p["version"].as_i64() > a["version"].as_i64());
    }

    #[test]
    fn schedule_times_are_validated_at_creation() {
        let mut r = remote();
        let err = r
            .insert(
                Collection::Schedules,
                json!({ "name": "Late", "start_time": "10:00", "end_time": "09:00" }),
            )
            .expect_err("start after end");
        assert!(matches!(err, RemoteError::Rejected(_)));
        assert!(r.fetch_all(Collection::Schedules).expect("fetch").is_empty());
    }

    #[test]
    fn negative_amount_is_rejected() {
        let mut r = remote();
        let err = r
            .insert(
                Collection::Payments,
                json!({ "student_id": "x", "amount": -1, "payment_date": "2024-01-01" }),
            )
            .expect_err("negative");
        assert!(matches!(err, RemoteError::Rejected(_)));
    }

    #[test]
    fn subscribers_receive_events_for_their_collection_only() {
        let mut r = remote();
        let (tx, rx) = mpsc::channel();
        let handle = r.subscribe(Collection::Payments, tx).expect("subscribe");
        r.insert(Collection::Enrollees, json!({ "name": "A", "last_name": "B" }))
            .expect("insert");
        assert!(rx.try_recv().is_err());

        let p = r
            .insert(
                Collection::Payments,
                json!({ "student_id": "e", "amount": 5, "payment_date": "2024-02-01" }),
            )
            .expect("insert payment");
        let ev = rx.try_recv().expect("event");
        assert_eq!(ev.kind, ChangeKind::Inserted);
        assert_eq!(ev.record["id"], p["id"]);

        r.unsubscribe(handle).expect("unsubscribe");
        assert_eq!(r.subscriber_count(), 0);
    }

    #[test]
    fn update_merges_patch_and_delete_publishes_tombstone() {
        let mut r = remote();
        let (tx, rx) = mpsc::channel();
        r.subscribe(Collection::Schedules, tx).expect("subscribe");
        let s = r
            .insert(
                Collection::Schedules,
                json!({ "name": "Yoga", "days": ["monday"], "start_time": "08:00", "end_time": "09:00", "max_capacity": 10 }),
            )
            .expect("insert");
        let id = EntityId::from_record(&s).expect("id");
        let u = r
            .update(Collection::Schedules, &id, json!({ "max_capacity": 12 }))
            .expect("update");
        assert_eq!(u["max_capacity"], json!(12));
        assert_eq!(u["name"], json!("Yoga"));
        assert_eq!(u["days"], json!(["monday"]));

        r.delete(Collection::Schedules, &id).expect("delete");
        r.delete(Collection::Schedules, &id).expect("delete absent");
        let kinds: Vec<ChangeKind> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Inserted, ChangeKind::Updated, ChangeKind::Deleted]
        );
    }

    #[test]
    fn update_of_missing_row_is_not_found() {
        let mut r = remote();
        let err = r
            .update(Collection::Payments, &"nope".into(), json!({ "amount": 1 }))
            .expect_err("missing");
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }
}
