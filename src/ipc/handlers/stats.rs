use crate::ipc::error::{no_workspace, ok};
use crate::ipc::helpers::{get_year_month, resolve_today};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_stats_month(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return no_workspace(&req.id);
    };
    let (year, month) = match get_year_month(&req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    let today = match resolve_today(state, &req.params) {
        Ok(v) => v,
        Err(error) => return error.response(&req.id),
    };
    ok(&req.id, json!(engine.monthly_stats(year, month, today)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.month" => Some(handle_stats_month(state, req)),
        _ => None,
    }
}
