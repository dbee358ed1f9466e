use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use studiod::engine::{ReplicaEngine, SyncError};
use studiod::model::{EnrolleeDraft, EntityId, PaymentDraft};
use studiod::remote::{
    ChangeEvent, ChangeKind, Collection, RemoteError, RemoteStore, SqliteRemote, SubscriptionHandle,
};

#[derive(Default)]
struct Controls {
    fail_fetch: HashSet<Collection>,
    fail_subscribe: HashSet<Collection>,
    fail_unsubscribe: HashSet<Collection>,
    fetches: usize,
    unsubscribed: Vec<Collection>,
    sinks: Vec<(SubscriptionHandle, Sender<ChangeEvent>)>,
}

/// Remote whose rows are fixed and whose feeds are driven by the test.
struct ScriptedRemote {
    rows: HashMap<Collection, Vec<Value>>,
    controls: Arc<Mutex<Controls>>,
    next: u64,
}

impl ScriptedRemote {
    fn new(rows: HashMap<Collection, Vec<Value>>) -> (Self, Arc<Mutex<Controls>>) {
        let controls = Arc::new(Mutex::new(Controls::default()));
        (
            Self {
                rows,
                controls: controls.clone(),
                next: 1,
            },
            controls,
        )
    }
}

impl RemoteStore for ScriptedRemote {
    fn fetch_all(&mut self, collection: Collection) -> Result<Vec<Value>, RemoteError> {
        let mut c = self.controls.lock().expect("controls");
        if c.fail_fetch.contains(&collection) {
            return Err(RemoteError::Transport("offline".to_string()));
        }
        c.fetches += 1;
        Ok(self.rows.get(&collection).cloned().unwrap_or_default())
    }

    fn subscribe(
        &mut self,
        collection: Collection,
        sink: Sender<ChangeEvent>,
    ) -> Result<SubscriptionHandle, RemoteError> {
        let mut c = self.controls.lock().expect("controls");
        if c.fail_subscribe.contains(&collection) {
            return Err(RemoteError::Subscription("refused".to_string()));
        }
        let handle = SubscriptionHandle {
            collection,
            id: self.next,
        };
        self.next += 1;
        c.sinks.push((handle, sink));
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), RemoteError> {
        let mut c = self.controls.lock().expect("controls");
        c.unsubscribed.push(handle.collection);
        c.sinks.retain(|(h, _)| *h != handle);
        if c.fail_unsubscribe.contains(&handle.collection) {
            return Err(RemoteError::Subscription("channel already closed".to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, _: Collection, _: Value) -> Result<Value, RemoteError> {
        Err(RemoteError::Transport("read-only".to_string()))
    }

    fn update(&mut self, collection: Collection, id: &EntityId, _: Value) -> Result<Value, RemoteError> {
        Err(RemoteError::NotFound {
            collection,
            id: id.clone(),
        })
    }

    fn delete(&mut self, _: Collection, _: &EntityId) -> Result<(), RemoteError> {
        Err(RemoteError::Transport("read-only".to_string()))
    }
}

fn send(controls: &Arc<Mutex<Controls>>, collection: Collection, event: ChangeEvent) {
    let c = controls.lock().expect("controls");
    for (h, sink) in &c.sinks {
        if h.collection == collection {
            sink.send(event.clone()).expect("send");
        }
    }
}

fn enrollee_event(kind: ChangeKind, id: &str, version: u64) -> ChangeEvent {
    ChangeEvent {
        kind,
        record: json!({ "id": id, "name": "Ana", "last_name": "García" }),
        version: Some(version),
    }
}

fn seeded() -> HashMap<Collection, Vec<Value>> {
    let mut rows = HashMap::new();
    rows.insert(
        Collection::Enrollees,
        vec![json!({ "id": "e1", "name": "Ana", "last_name": "García", "version": 1 })],
    );
    rows.insert(
        Collection::Payments,
        vec![json!({ "id": "p1", "student_id": "e1", "amount": "350", "payment_date": "2024-01-31", "version": 2 })],
    );
    rows.insert(
        Collection::Schedules,
        vec![json!({ "id": "s1", "name": "Yoga", "days": ["monday"], "start_time": "08:00", "end_time": "09:00", "max_capacity": 10, "version": 3 })],
    );
    rows
}

#[test]
fn open_loads_all_collections_and_normalizes_schedules() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    let engine = ReplicaEngine::open(remote).expect("open");

    assert!(engine.is_loaded());
    assert_eq!(engine.open_feed_collections(), Collection::ALL.to_vec());
    let replica = engine.replica();
    assert_eq!(replica.enrollees().len(), 1);
    assert_eq!(replica.payments().get(&"p1".into()).map(|p| p.amount), Some(350.0));
    let yoga = replica.schedules().get(&"s1".into()).expect("schedule");
    assert_eq!(yoga.start_time, "08:00");
    assert_eq!(yoga.max_capacity, Some(10));
    assert_eq!(controls.lock().expect("controls").fetches, 3);
}

#[test]
fn bulk_load_is_all_or_nothing() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    controls
        .lock()
        .expect("controls")
        .fail_fetch
        .insert(Collection::Schedules);
    let mut engine = ReplicaEngine::new(remote);

    let e = engine.load_all().err().expect("load must fail");
    assert!(matches!(e, SyncError::Remote { collection: Collection::Schedules, .. }));
    assert!(!engine.is_loaded());
    assert!(engine.replica().enrollees().is_empty());
    assert!(engine.replica().payments().is_empty());
}

#[test]
fn subscribe_failure_keeps_other_feeds_and_reopens_without_reloading() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    controls
        .lock()
        .expect("controls")
        .fail_subscribe
        .insert(Collection::Payments);
    let mut engine = ReplicaEngine::new(remote);
    engine.load_all().expect("load");

    assert!(engine.open_feeds().is_err());
    assert_eq!(
        engine.open_feed_collections(),
        vec![Collection::Enrollees, Collection::Schedules]
    );

    controls.lock().expect("controls").fail_subscribe.clear();
    engine.open_feeds().expect("retry");
    assert_eq!(engine.open_feed_collections().len(), 3);
    assert_eq!(controls.lock().expect("controls").fetches, 3);

    engine.reopen_feeds().expect("reopen");
    assert_eq!(engine.open_feed_collections().len(), 3);
    assert_eq!(controls.lock().expect("controls").fetches, 3);
    assert_eq!(engine.replica().enrollees().len(), 1);
}

#[test]
fn close_attempts_every_feed_even_when_one_fails() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    controls
        .lock()
        .expect("controls")
        .fail_unsubscribe
        .insert(Collection::Enrollees);
    let engine = ReplicaEngine::open(remote).expect("open");

    match engine.close() {
        Err(SyncError::Teardown { failed, total, .. }) => {
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("unexpected close result: {:?}", other),
    }
    let c = controls.lock().expect("controls");
    assert_eq!(c.unsubscribed, Collection::ALL.to_vec());
    assert!(c.sinks.is_empty());
}

#[test]
fn dropping_the_engine_unsubscribes() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    let engine = ReplicaEngine::open(remote).expect("open");
    drop(engine);
    assert_eq!(controls.lock().expect("controls").unsubscribed.len(), 3);
}

#[test]
fn versioned_events_never_let_a_stale_delete_win() {
    let (remote, controls) = ScriptedRemote::new(HashMap::new());
    let mut engine = ReplicaEngine::open(remote).expect("open");

    send(&controls, Collection::Enrollees, enrollee_event(ChangeKind::Inserted, "e9", 5));
    send(&controls, Collection::Enrollees, enrollee_event(ChangeKind::Deleted, "e9", 3));
    let report = engine.pump();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.ignored, 1);
    assert!(engine.replica().enrollees().contains(&"e9".into()));

    send(&controls, Collection::Enrollees, enrollee_event(ChangeKind::Deleted, "e9", 6));
    send(&controls, Collection::Enrollees, enrollee_event(ChangeKind::Updated, "e9", 5));
    let report = engine.pump();
    assert_eq!(report.removed, 1);
    assert_eq!(report.ignored, 1);
    assert!(!engine.replica().enrollees().contains(&"e9".into()));

    // Re-delivering the delete is harmless.
    send(&controls, Collection::Enrollees, enrollee_event(ChangeKind::Deleted, "e9", 6));
    engine.pump();
    assert!(engine.replica().enrollees().is_empty());
}

#[test]
fn malformed_events_are_dropped_without_touching_the_replica() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    let mut engine = ReplicaEngine::open(remote).expect("open");

    send(
        &controls,
        Collection::Payments,
        ChangeEvent {
            kind: ChangeKind::Inserted,
            record: json!({ "amount": 10 }),
            version: Some(9),
        },
    );
    send(
        &controls,
        Collection::Payments,
        ChangeEvent {
            kind: ChangeKind::Inserted,
            record: json!({ "id": "p2", "student_id": "e1", "amount": 10, "payment_date": "soon" }),
            version: Some(10),
        },
    );
    let report = engine.pump();
    assert_eq!(report.malformed, 2);
    assert_eq!(engine.replica().payments().len(), 1);
}

#[test]
fn disconnected_feeds_are_dropped_and_can_be_restored() {
    let (remote, controls) = ScriptedRemote::new(seeded());
    let mut engine = ReplicaEngine::open(remote).expect("open");

    controls
        .lock()
        .expect("controls")
        .sinks
        .retain(|(h, _)| h.collection != Collection::Schedules);
    engine.pump();
    assert_eq!(
        engine.open_feed_collections(),
        vec![Collection::Enrollees, Collection::Payments]
    );
    engine.open_feeds().expect("restore");
    assert_eq!(engine.open_feed_collections().len(), 3);
}

#[test]
fn failed_writes_leave_the_replica_unchanged() {
    let (remote, _controls) = ScriptedRemote::new(seeded());
    let mut engine = ReplicaEngine::open(remote).expect("open");
    let before = engine.replica().enrollees().snapshot();

    let draft = EnrolleeDraft {
        name: "Eva".to_string(),
        last_name: "Bravo".to_string(),
        ..EnrolleeDraft::default()
    };
    assert!(engine.create_enrollee(&draft).is_err());
    let e = engine.update_enrollee(&"e1".into(), &draft).err().expect("update fails");
    assert!(e.is_not_found());
    assert!(engine.delete_enrollee(&"e1".into()).is_err());

    engine.pump();
    assert_eq!(engine.replica().enrollees().snapshot(), before);
}

#[test]
fn sqlite_writes_arrive_through_the_feed() {
    let remote = SqliteRemote::open_in_memory().expect("store");
    let mut engine = ReplicaEngine::open(remote).expect("open");
    assert_eq!(engine.remote().subscriber_count(), 3);

    let draft = EnrolleeDraft {
        name: "Ana".to_string(),
        last_name: "García".to_string(),
        ..EnrolleeDraft::default()
    };
    let ana = engine.create_enrollee(&draft).expect("create");
    assert!(engine.replica().enrollees().is_empty());

    let report = engine.pump();
    assert_eq!(report.upserted, 1);
    let mirrored = engine.replica().enrollees().get(&ana.id).expect("mirrored");
    assert_eq!(mirrored.version, ana.version);

    let payment = PaymentDraft {
        enrollee_id: ana.id.clone(),
        amount: 200.0,
        payment_date: chrono::NaiveDate::from_ymd_opt(2024, 2, 10).expect("date"),
        current_weight: None,
    };
    let paid = engine.create_payment(&payment).expect("payment");
    engine.delete_payment(&paid.id).expect("delete");
    let report = engine.pump();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.removed, 1);
    assert!(engine.replica().payments().is_empty());

    engine.close().expect("close");
}
