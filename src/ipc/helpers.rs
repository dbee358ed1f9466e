use crate::calendar::CalendarError;
use crate::engine::{ReplicaEngine, SyncError};
use crate::ipc::error::{err, no_workspace, ok, ErrorCode};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_wire_date, EntityId};
use crate::remote::{RemoteError, SqliteRemote};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;

pub(crate) struct HandlerErr {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::BadParams,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SyncError> for HandlerErr {
    fn from(e: SyncError) -> Self {
        let code = match &e {
            _ if e.is_not_found() => ErrorCode::NotFound,
            SyncError::Remote {
                source: RemoteError::Rejected(_),
                ..
            } => ErrorCode::BadParams,
            _ => ErrorCode::RemoteFailed,
        };
        let details = match &e {
            SyncError::Remote { collection, .. } | SyncError::Decode { collection, .. } => {
                Some(serde_json::json!({ "collection": collection }))
            }
            SyncError::Teardown { failed, total, .. } => {
                Some(serde_json::json!({ "failed": failed, "total": total }))
            }
        };
        Self {
            code,
            message: e.to_string(),
            details,
        }
    }
}

impl From<CalendarError> for HandlerErr {
    fn from(e: CalendarError) -> Self {
        HandlerErr::bad_params(e.to_string())
    }
}

pub(crate) type EngineOp =
    fn(&mut ReplicaEngine<SqliteRemote>, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

/// Runs a write request against the open engine. The replica itself only
/// changes once the resulting change event is pumped.
pub(crate) fn handle_engine_write(state: &mut AppState, req: &Request, op: EngineOp) -> serde_json::Value {
    let Some(engine) = state.engine.as_mut() else {
        return no_workspace(&req.id);
    };
    match op(engine, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub(crate) fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub(crate) fn get_optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Ids arrive as strings from the UI but numeric ids are accepted too.
pub(crate) fn get_required_id(params: &serde_json::Value, key: &str) -> Result<EntityId, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(v.clone())
        .map_err(|_| HandlerErr::bad_params(format!("{} must be a non-empty string or number", key)))
}

pub(crate) fn get_required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Deserializes `params[key]` into a typed draft.
pub(crate) fn get_required_obj<T: DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<T, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(v.clone()).map_err(|e| HandlerErr {
        code: ErrorCode::BadParams,
        message: format!("invalid {}: {}", key, e),
        details: None,
    })
}

pub(crate) fn get_optional_date(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<NaiveDate>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(parse_wire_date)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

/// `params.today` when given, otherwise the configured or local day.
pub(crate) fn resolve_today(state: &AppState, params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    Ok(get_optional_date(params, "today")?.unwrap_or_else(|| state.config.today()))
}

pub(crate) fn parse_month_key(month: &str) -> Result<(i32, u32), HandlerErr> {
    let t = month.trim();
    let Some((y, m)) = t.split_once('-') else {
        return Err(HandlerErr::bad_params("month must be YYYY-MM"));
    };
    let year = y
        .parse::<i32>()
        .map_err(|_| HandlerErr::bad_params("month year must be numeric"))?;
    let month_num = m
        .parse::<u32>()
        .map_err(|_| HandlerErr::bad_params("month must be YYYY-MM"))?;
    if !(1..=12).contains(&month_num) {
        return Err(HandlerErr::bad_params("month must be between 01 and 12"));
    }
    Ok((year, month_num))
}

/// Either `month: "YYYY-MM"` or numeric `year` + `month`, optionally moved
/// by `offset` months.
pub(crate) fn get_year_month(params: &serde_json::Value) -> Result<(i32, u32), HandlerErr> {
    let (year, month) = match params.get("month") {
        Some(serde_json::Value::String(key)) => parse_month_key(key)?,
        Some(m) => {
            let month = m
                .as_u64()
                .ok_or_else(|| HandlerErr::bad_params("month must be YYYY-MM or 1-12"))?;
            let year = params
                .get("year")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| HandlerErr::bad_params("missing year"))?;
            let year = i32::try_from(year).map_err(|_| HandlerErr::bad_params("year out of range"))?;
            let month = u32::try_from(month).map_err(|_| HandlerErr::bad_params("month out of range"))?;
            (year, month)
        }
        None => return Err(HandlerErr::bad_params("missing month")),
    };
    let offset = params.get("offset").and_then(|v| v.as_i64()).unwrap_or(0);
    let offset = i32::try_from(offset).map_err(|_| HandlerErr::bad_params("offset out of range"))?;
    Ok(crate::calendar::shift_month(year, month, offset)?)
}
