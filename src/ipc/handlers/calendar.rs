use crate::calendar;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_date, get_required_str, get_year_month, resolve_today, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::parse_wire_date;
use crate::validity::payment_status;
use chrono::NaiveTime;
use serde_json::json;

// Without a workspace the grids are still useful, just bare.

fn calendar_month(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let (year, month) = get_year_month(params)?;
    let today = resolve_today(state, params)?;
    let view = match state.engine.as_ref() {
        Some(engine) => engine.month_view(year, month, today)?,
        None => calendar::month_view(year, month, &[], &[], today)?,
    };
    Ok(json!(view))
}

fn calendar_week(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_required_str(params, "date")?;
    let date = parse_wire_date(&raw).ok_or_else(|| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    let today = resolve_today(state, params)?;
    let view = match state.engine.as_ref() {
        Some(engine) => engine.week_view(date, today),
        None => calendar::week_view(date, &[], &[], today),
    };
    Ok(json!(view))
}

fn validity_check(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let last = get_optional_date(params, "lastPaymentDate")?;
    let today = resolve_today(state, params)?;
    Ok(json!(payment_status(last, today.and_time(NaiveTime::MIN))))
}

fn handle_with(
    state: &mut AppState,
    req: &Request,
    op: fn(&AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match op(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.month" => Some(handle_with(state, req, calendar_month)),
        "calendar.week" => Some(handle_with(state, req, calendar_week)),
        "validity.check" => Some(handle_with(state, req, validity_check)),
        _ => None,
    }
}
