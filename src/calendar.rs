//! Month and week grids, Monday-first.
//!
//! The grid builder is pure: the same (year, month) always yields the same
//! rectangular N × 7 grid. Enrichment attaches the schedules that occur on
//! each date together with their occupancy.

use crate::model::{Enrollee, EntityId, Schedule, Weekday};
use crate::occupancy::occupancy;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;

pub const MONTHS_TITLE_ES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("year {0} is out of range")]
    InvalidYear(i32),
    #[error("month offset {0} leaves the supported date range")]
    OffsetOutOfRange(i32),
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: NaiveDate,
    pub day: u32,
    pub weekday: &'static str,
}

impl DayCell {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            day: date.day(),
            weekday: Weekday::of(date).tag(),
        }
    }
}

pub type Week<T> = [Option<T>; 7];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Week<DayCell>>,
}

impl MonthGrid {
    /// Date-bearing cells in order, placeholders skipped.
    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.weeks.iter().flat_map(|w| w.iter().flatten())
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    if !(1..=12).contains(&month) {
        return Err(CalendarError::InvalidMonth(month));
    }
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::InvalidYear(year))
}

pub fn month_grid(year: i32, month: u32) -> Result<MonthGrid, CalendarError> {
    let first = first_of_month(year, month)?;
    let last_day = days_in_month(year, month);

    let mut weeks: Vec<Week<DayCell>> = Vec::with_capacity(6);
    let mut week: Week<DayCell> = [None; 7];
    let mut col = Weekday::of(first).column();

    for offset in 0..last_day {
        let date = first + Duration::days(i64::from(offset));
        week[col] = Some(DayCell::new(date));
        col += 1;
        if col == 7 {
            weeks.push(week);
            week = [None; 7];
            col = 0;
        }
    }
    if col > 0 {
        weeks.push(week);
    }

    Ok(MonthGrid { year, month, weeks })
}

/// Moves `delta` months forward (or back) from (year, month).
///
/// The result must still be a month chrono can represent.
pub fn shift_month(year: i32, month: u32, delta: i32) -> Result<(i32, u32), CalendarError> {
    first_of_month(year, month)?;
    let index = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(delta);
    let shifted_year =
        i32::try_from(index.div_euclid(12)).map_err(|_| CalendarError::OffsetOutOfRange(delta))?;
    let shifted_month = index.rem_euclid(12) as u32 + 1;
    first_of_month(shifted_year, shifted_month).map_err(|_| CalendarError::OffsetOutOfRange(delta))?;
    Ok((shifted_year, shifted_month))
}

/// The Monday-first week containing `date`.
pub fn week_of(date: NaiveDate) -> [NaiveDate; 7] {
    let monday = date - Duration::days(i64::from(Weekday::of(date).column() as u32));
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

/// Schedules that occur on `date`, i.e. whose weekday tags include it.
pub fn schedules_on<'a>(date: NaiveDate, schedules: &'a [Schedule]) -> Vec<&'a Schedule> {
    schedules.iter().filter(|s| s.occurs_on(date)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSchedule {
    pub id: EntityId,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub max_capacity: Option<u32>,
    pub occupancy: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCell {
    #[serde(flatten)]
    pub day: DayCell,
    pub is_today: bool,
    pub schedules: Vec<CellSchedule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub title: String,
    pub weeks: Vec<Week<CalendarCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekView {
    pub days: Vec<CalendarCell>,
}

fn enrich(day: DayCell, schedules: &[Schedule], enrollees: &[Enrollee], today: NaiveDate) -> CalendarCell {
    let mut attached: Vec<CellSchedule> = schedules_on(day.date, schedules)
        .into_iter()
        .map(|s| CellSchedule {
            id: s.id.clone(),
            name: s.name.clone(),
            start_time: s.start_time.clone(),
            end_time: s.end_time.clone(),
            max_capacity: s.max_capacity,
            occupancy: occupancy(s, enrollees),
        })
        .collect();
    attached.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
    CalendarCell {
        day,
        is_today: day.date == today,
        schedules: attached,
    }
}

pub fn month_view(
    year: i32,
    month: u32,
    schedules: &[Schedule],
    enrollees: &[Enrollee],
    today: NaiveDate,
) -> Result<MonthView, CalendarError> {
    let grid = month_grid(year, month)?;
    let weeks = grid
        .weeks
        .into_iter()
        .map(|week| week.map(|slot| slot.map(|day| enrich(day, schedules, enrollees, today))))
        .collect();
    Ok(MonthView {
        year,
        month,
        title: format!("{} {}", MONTHS_TITLE_ES[(month - 1) as usize], year),
        weeks,
    })
}

pub fn week_view(
    date: NaiveDate,
    schedules: &[Schedule],
    enrollees: &[Enrollee],
    today: NaiveDate,
) -> WeekView {
    WeekView {
        days: week_of(date)
            .into_iter()
            .map(|d| enrich(DayCell::new(d), schedules, enrollees, today))
            .collect(),
    }
}
