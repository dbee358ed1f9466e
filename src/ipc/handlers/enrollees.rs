use crate::engine::ReplicaEngine;
use crate::ipc::error::{no_workspace, ok};
use crate::ipc::helpers::{
    get_optional_str, get_required_bool, get_required_id, get_required_obj, handle_engine_write,
    resolve_today, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::EnrolleeDraft;
use crate::remote::SqliteRemote;
use serde_json::json;

fn enrollees_list(
    engine: &ReplicaEngine<SqliteRemote>,
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let today = resolve_today(state, params)?;
    let query = get_optional_str(params, "query");
    let rows = engine.enrollees(today, query);
    Ok(json!({ "today": today, "enrollees": rows }))
}

fn enrollees_create(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let draft: EnrolleeDraft = get_required_obj(params, "enrollee")?;
    let saved = engine.create_enrollee(&draft)?;
    Ok(json!({ "enrollee": saved }))
}

fn enrollees_update(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let draft: EnrolleeDraft = get_required_obj(params, "enrollee")?;
    let saved = engine.update_enrollee(&id, &draft)?;
    Ok(json!({ "enrollee": saved }))
}

fn enrollees_set_active(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let active = get_required_bool(params, "active")?;
    let saved = engine.set_enrollee_active(&id, active)?;
    Ok(json!({ "enrollee": saved }))
}

fn enrollees_delete(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    engine.delete_enrollee(&id)?;
    Ok(json!({ "deleted": id }))
}

fn handle_enrollees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return no_workspace(&req.id);
    };
    match enrollees_list(engine, state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollees.list" => Some(handle_enrollees_list(state, req)),
        "enrollees.create" => Some(handle_engine_write(state, req, enrollees_create)),
        "enrollees.update" => Some(handle_engine_write(state, req, enrollees_update)),
        "enrollees.setActive" => Some(handle_engine_write(state, req, enrollees_set_active)),
        "enrollees.delete" => Some(handle_engine_write(state, req, enrollees_delete)),
        _ => None,
    }
}
