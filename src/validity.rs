//! Membership validity: a payment covers one calendar month.
//!
//! The expiry keeps the payment's day-of-month and clamps to the end of
//! shorter months (Jan 31 → Feb 29 in leap years, Feb 28 otherwise). The
//! expiry day counts in full (up to 23:59:59.999) while "now" is truncated to
//! the start of its day, so time-of-day never decides the outcome.

use crate::calendar::days_in_month;
use crate::model::{EntityId, Payment};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;

const WEEKDAYS_ES: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

pub const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

pub const UNRECORDED_LABEL: &str = "No registrado";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub active: bool,
    pub last_payment_date: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
    pub expires_label: String,
}

/// `last + 1 month`, day clamped to the target month's length.
pub fn expiry_date(last_payment: NaiveDate) -> NaiveDate {
    let (year, month) = if last_payment.month() == 12 {
        (last_payment.year() + 1, 1)
    } else {
        (last_payment.year(), last_payment.month() + 1)
    };
    let day = last_payment.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(last_payment)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::milliseconds(86_399_999)
}

pub fn payment_status(last_payment: Option<NaiveDate>, now: NaiveDateTime) -> PaymentStatus {
    let Some(last) = last_payment else {
        return PaymentStatus {
            active: false,
            last_payment_date: None,
            expires_on: None,
            expires_label: UNRECORDED_LABEL.to_string(),
        };
    };
    let expiry = expiry_date(last);
    let today_start = now.date().and_time(NaiveTime::MIN);
    PaymentStatus {
        active: today_start <= end_of_day(expiry),
        last_payment_date: Some(last),
        expires_on: Some(expiry),
        expires_label: long_date_label(expiry),
    }
}

pub fn is_payment_valid(last_payment: Option<NaiveDate>, today: NaiveDate) -> bool {
    payment_status(last_payment, today.and_time(NaiveTime::MIN)).active
}

/// `"jueves, 29 de febrero de 2024"`
pub fn long_date_label(date: NaiveDate) -> String {
    format!(
        "{}, {} de {} de {}",
        WEEKDAYS_ES[date.weekday().num_days_from_monday() as usize],
        date.day(),
        MONTHS_ES[date.month0() as usize],
        date.year()
    )
}

pub fn last_payment_date<'a, I>(payments: I, enrollee_id: &EntityId) -> Option<NaiveDate>
where
    I: IntoIterator<Item = &'a Payment>,
{
    payments
        .into_iter()
        .filter(|p| &p.enrollee_id == enrollee_id)
        .map(|p| p.payment_date)
        .max()
}

/// Latest payment date per referenced enrollee, in one pass.
pub fn last_payment_index<'a, I>(payments: I) -> HashMap<EntityId, NaiveDate>
where
    I: IntoIterator<Item = &'a Payment>,
{
    let mut out: HashMap<EntityId, NaiveDate> = HashMap::new();
    for p in payments {
        out.entry(p.enrollee_id.clone())
            .and_modify(|d| {
                if p.payment_date > *d {
                    *d = p.payment_date;
                }
            })
            .or_insert(p.payment_date);
    }
    out
}
