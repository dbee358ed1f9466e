//! The replica engine: bulk load, change feeds, write requests, teardown.
//!
//! The engine is an explicit context object. Whoever owns it drives it
//! cooperatively by calling [`ReplicaEngine::pump`]; change events queue up in
//! per-feed channels until then, and reads in between see the last reconciled
//! state.

use crate::calendar::{CalendarError, MonthView, WeekView};
use crate::model::{
    EnrolleeDraft, Enrollee, EntityId, Payment, PaymentDraft, Schedule, ScheduleDraft,
};
use crate::normalize::denormalize_schedule;
use crate::reconcile::{apply_event, canonical_record, load_collection, ApplyReport};
use crate::remote::{ChangeEvent, Collection, RemoteError, RemoteStore, SubscriptionHandle};
use crate::replica::Replica;
use crate::stats::MonthlyStats;
use crate::views::{self, EnrolleeView, PaymentView, ScheduleView};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{collection}: {source}")]
    Remote {
        collection: Collection,
        #[source]
        source: RemoteError,
    },

    #[error("unreadable {collection} record from remote: {message}")]
    Decode {
        collection: Collection,
        message: String,
    },

    #[error("failed to close {failed} of {total} change feeds: {first}")]
    Teardown {
        failed: usize,
        total: usize,
        first: RemoteError,
    },
}

impl SyncError {
    fn remote(collection: Collection) -> impl FnOnce(RemoteError) -> SyncError {
        move |source| SyncError::Remote { collection, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::Remote {
                source: RemoteError::NotFound { .. },
                ..
            }
        )
    }
}

struct Feed {
    handle: SubscriptionHandle,
    events: Receiver<ChangeEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub loaded: bool,
    pub open_feeds: Vec<Collection>,
    pub enrollees: usize,
    pub payments: usize,
    pub schedules: usize,
    pub applied: ApplyReport,
}

pub struct ReplicaEngine<R: RemoteStore> {
    remote: R,
    replica: Replica,
    feeds: Vec<Feed>,
    loaded: bool,
    applied: ApplyReport,
}

impl<R: RemoteStore> ReplicaEngine<R> {
    /// An engine with an empty replica and no feeds.
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            replica: Replica::new(),
            feeds: Vec::new(),
            loaded: false,
            applied: ApplyReport::default(),
        }
    }

    /// Bulk load, then subscribe to all three feeds.
    pub fn open(remote: R) -> Result<Self, SyncError> {
        let mut engine = Self::new(remote);
        engine.load_all()?;
        engine.open_feeds()?;
        info!(
            enrollees = engine.replica.enrollees().len(),
            payments = engine.replica.payments().len(),
            schedules = engine.replica.schedules().len(),
            "replica engine opened"
        );
        Ok(engine)
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn open_feed_collections(&self) -> Vec<Collection> {
        self.feeds.iter().map(|f| f.handle.collection).collect()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            loaded: self.loaded,
            open_feeds: self.open_feed_collections(),
            enrollees: self.replica.enrollees().len(),
            payments: self.replica.payments().len(),
            schedules: self.replica.schedules().len(),
            applied: self.applied,
        }
    }

    /// Fetches all three collections and replaces the replica's contents.
    /// Nothing is replaced unless every fetch succeeds.
    pub fn load_all(&mut self) -> Result<ApplyReport, SyncError> {
        let mut fetched = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let rows = self
                .remote
                .fetch_all(collection)
                .map_err(SyncError::remote(collection))?;
            fetched.push((collection, rows));
        }

        let mut report = ApplyReport::default();
        for (collection, rows) in fetched {
            let r = load_collection(&mut self.replica, collection, rows);
            debug!(%collection, rows = r.upserted, malformed = r.malformed, "collection loaded");
            report.merge(r);
        }
        self.loaded = true;
        Ok(report)
    }

    /// Subscribes every collection that has no open feed. Feeds that
    /// subscribe successfully stay open even if a sibling fails; the first
    /// failure is returned and the call can simply be repeated.
    pub fn open_feeds(&mut self) -> Result<(), SyncError> {
        let mut first_err = None;
        for collection in Collection::ALL {
            if self.feeds.iter().any(|f| f.handle.collection == collection) {
                continue;
            }
            let (tx, rx) = mpsc::channel();
            match self.remote.subscribe(collection, tx) {
                Ok(handle) => {
                    debug!(%collection, id = handle.id, "change feed open");
                    self.feeds.push(Feed { handle, events: rx });
                }
                Err(e) => {
                    warn!(%collection, error = %e, "change feed subscription failed");
                    if first_err.is_none() {
                        first_err = Some(SyncError::Remote { collection, source: e });
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tears every feed down and subscribes again without reloading.
    pub fn reopen_feeds(&mut self) -> Result<(), SyncError> {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "teardown before reopen was incomplete");
        }
        self.open_feeds()
    }

    /// Applies every queued change event. Feeds whose sender went away are
    /// dropped so that `open_feeds` can restore them.
    pub fn pump(&mut self) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut dead = Vec::new();
        for (i, feed) in self.feeds.iter().enumerate() {
            let collection = feed.handle.collection;
            loop {
                match feed.events.try_recv() {
                    Ok(event) => report.record(apply_event(&mut self.replica, collection, event)),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!(%collection, "change feed disconnected");
                        dead.push(i);
                        break;
                    }
                }
            }
        }
        for i in dead.into_iter().rev() {
            self.feeds.remove(i);
        }
        if report.total() > 0 {
            debug!(?report, "pumped change events");
        }
        self.applied.merge(report);
        report
    }

    /// Unsubscribes every feed, continuing past individual failures.
    fn teardown(&mut self) -> Result<(), SyncError> {
        let total = self.feeds.len();
        let mut failed = 0;
        let mut first = None;
        for feed in std::mem::take(&mut self.feeds) {
            let collection = feed.handle.collection;
            if let Err(e) = self.remote.unsubscribe(feed.handle) {
                warn!(%collection, error = %e, "unsubscribe failed");
                failed += 1;
                first.get_or_insert(e);
            }
        }
        match first {
            Some(first) => Err(SyncError::Teardown { failed, total, first }),
            None => Ok(()),
        }
    }

    /// Unsubscribes all feeds, then releases the replica.
    pub fn close(mut self) -> Result<(), SyncError> {
        let result = self.teardown();
        self.replica = Replica::new();
        self.loaded = false;
        info!("replica engine closed");
        result
    }

    // Write requests.
    //
    // None of these touch the replica. The change feed delivers the
    // persisted row like any other change.

    fn decode<T: DeserializeOwned>(collection: Collection, record: Value) -> Result<T, SyncError> {
        serde_json::from_value(canonical_record(collection, record)).map_err(|e| SyncError::Decode {
            collection,
            message: e.to_string(),
        })
    }

    fn schedule_wire(draft: &ScheduleDraft) -> Result<Value, SyncError> {
        let canonical = serde_json::to_value(draft).map_err(|e| SyncError::Decode {
            collection: Collection::Schedules,
            message: e.to_string(),
        })?;
        Ok(denormalize_schedule(canonical))
    }

    fn insert<T: DeserializeOwned>(&mut self, collection: Collection, record: Value) -> Result<T, SyncError> {
        let saved = self
            .remote
            .insert(collection, record)
            .map_err(SyncError::remote(collection))?;
        Self::decode(collection, saved)
    }

    fn update<T: DeserializeOwned>(
        &mut self,
        collection: Collection,
        id: &EntityId,
        patch: Value,
    ) -> Result<T, SyncError> {
        let saved = self
            .remote
            .update(collection, id, patch)
            .map_err(SyncError::remote(collection))?;
        Self::decode(collection, saved)
    }

    fn delete(&mut self, collection: Collection, id: &EntityId) -> Result<(), SyncError> {
        self.remote
            .delete(collection, id)
            .map_err(SyncError::remote(collection))
    }

    pub fn create_enrollee(&mut self, draft: &EnrolleeDraft) -> Result<Enrollee, SyncError> {
        self.insert(Collection::Enrollees, draft.to_wire())
    }

    pub fn update_enrollee(&mut self, id: &EntityId, draft: &EnrolleeDraft) -> Result<Enrollee, SyncError> {
        self.update(Collection::Enrollees, id, draft.to_wire())
    }

    pub fn set_enrollee_active(&mut self, id: &EntityId, active: bool) -> Result<Enrollee, SyncError> {
        self.update(Collection::Enrollees, id, json!({ "is_active": active }))
    }

    pub fn delete_enrollee(&mut self, id: &EntityId) -> Result<(), SyncError> {
        self.delete(Collection::Enrollees, id)
    }

    pub fn create_payment(&mut self, draft: &PaymentDraft) -> Result<Payment, SyncError> {
        self.insert(Collection::Payments, draft.to_wire())
    }

    pub fn delete_payment(&mut self, id: &EntityId) -> Result<(), SyncError> {
        self.delete(Collection::Payments, id)
    }

    pub fn create_schedule(&mut self, draft: &ScheduleDraft) -> Result<Schedule, SyncError> {
        let wire = Self::schedule_wire(draft)?;
        self.insert(Collection::Schedules, wire)
    }

    pub fn update_schedule(&mut self, id: &EntityId, draft: &ScheduleDraft) -> Result<Schedule, SyncError> {
        let wire = Self::schedule_wire(draft)?;
        self.update(Collection::Schedules, id, wire)
    }

    pub fn delete_schedule(&mut self, id: &EntityId) -> Result<(), SyncError> {
        self.delete(Collection::Schedules, id)
    }

    // Decorated reads.

    pub fn enrollees(&self, today: NaiveDate, query: Option<&str>) -> Vec<EnrolleeView> {
        views::enrollee_views(&self.replica, today, query)
    }

    pub fn payments(&self) -> Vec<PaymentView> {
        views::payment_views(&self.replica)
    }

    pub fn schedules(&self) -> Vec<ScheduleView> {
        views::schedule_views(&self.replica)
    }

    pub fn month_view(&self, year: i32, month: u32, today: NaiveDate) -> Result<MonthView, CalendarError> {
        views::month_view(&self.replica, year, month, today)
    }

    pub fn week_view(&self, date: NaiveDate, today: NaiveDate) -> WeekView {
        views::week_view(&self.replica, date, today)
    }

    pub fn monthly_stats(&self, year: i32, month: u32, today: NaiveDate) -> MonthlyStats {
        views::monthly_stats(&self.replica, year, month, today)
    }
}

impl<R: RemoteStore> Drop for ReplicaEngine<R> {
    fn drop(&mut self) {
        if self.feeds.is_empty() {
            return;
        }
        if let Err(e) = self.teardown() {
            warn!(error = %e, "teardown on drop was incomplete");
        }
    }
}
