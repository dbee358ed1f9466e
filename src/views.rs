//! Decorated snapshots handed to the UI. Recomputed from the replica on
//! every call; nothing here mutates it.
//!
//! Every view serializes camelCase, flattened entity fields included.

use crate::calendar::{self, CalendarError, MonthView, WeekView};
use crate::model::{short_time, Enrollee, EntityId, Payment, Schedule};
use crate::occupancy::OccupancyIndex;
use crate::replica::Replica;
use crate::stats::{self, MonthlyStats};
use crate::validity::{payment_status, last_payment_index, PaymentStatus};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolleeView {
    #[serde(flatten)]
    pub enrollee: Enrollee,
    pub last_payment_date: Option<NaiveDate>,
    pub payment: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    /// None when the referenced enrollee is not in the replica.
    pub enrollee_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub time_label: String,
    pub occupancy: usize,
    pub is_full: bool,
}

fn sorted_enrollees(replica: &Replica) -> Vec<Enrollee> {
    let mut rows = replica.enrollees().snapshot();
    rows.sort_by(|a, b| {
        a.last_name
            .to_lowercase()
            .cmp(&b.last_name.to_lowercase())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.id.cmp(&b.id))
    });
    rows
}

fn sorted_schedules(replica: &Replica) -> Vec<Schedule> {
    let mut rows = replica.schedules().snapshot();
    rows.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    rows
}

fn matches_query(e: &Enrollee, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    q.is_empty() || e.name.to_lowercase().contains(&q) || e.last_name.to_lowercase().contains(&q)
}

pub fn enrollee_views(replica: &Replica, today: NaiveDate, query: Option<&str>) -> Vec<EnrolleeView> {
    let last = last_payment_index(replica.payments().iter());
    let now = today.and_time(NaiveTime::MIN);
    sorted_enrollees(replica)
        .into_iter()
        .filter(|e| query.map_or(true, |q| matches_query(e, q)))
        .map(|e| {
            let last_payment_date = last.get(&e.id).copied();
            EnrolleeView {
                payment: payment_status(last_payment_date, now),
                last_payment_date,
                enrollee: e,
            }
        })
        .collect()
}

/// Most recent first.
pub fn payment_views(replica: &Replica) -> Vec<PaymentView> {
    let names: HashMap<&EntityId, String> = replica
        .enrollees()
        .iter()
        .map(|e| (&e.id, e.full_name()))
        .collect();
    let mut rows: Vec<PaymentView> = replica
        .payments()
        .iter()
        .map(|p| PaymentView {
            enrollee_name: names.get(&p.enrollee_id).cloned(),
            payment: p.clone(),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.payment
            .payment_date
            .cmp(&a.payment.payment_date)
            .then_with(|| a.payment.id.cmp(&b.payment.id))
    });
    rows
}

pub fn schedule_views(replica: &Replica) -> Vec<ScheduleView> {
    let schedules = sorted_schedules(replica);
    let enrollees = replica.enrollees().snapshot();
    let index = OccupancyIndex::build(&schedules, &enrollees);
    schedules
        .into_iter()
        .map(|s| {
            let occupancy = index.get(&s.id);
            ScheduleView {
                time_label: format!("{} - {}", short_time(&s.start_time), short_time(&s.end_time)),
                is_full: s.max_capacity.map_or(false, |cap| occupancy >= cap as usize),
                occupancy,
                schedule: s,
            }
        })
        .collect()
}

pub fn month_view(
    replica: &Replica,
    year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<MonthView, CalendarError> {
    calendar::month_view(
        year,
        month,
        &sorted_schedules(replica),
        &replica.enrollees().snapshot(),
        today,
    )
}

pub fn week_view(replica: &Replica, date: NaiveDate, today: NaiveDate) -> WeekView {
    calendar::week_view(
        date,
        &sorted_schedules(replica),
        &replica.enrollees().snapshot(),
        today,
    )
}

pub fn monthly_stats(replica: &Replica, year: i32, month: u32, today: NaiveDate) -> MonthlyStats {
    stats::monthly_stats(
        &replica.enrollees().snapshot(),
        &replica.payments().snapshot(),
        year,
        month,
        today,
    )
}
