use crate::engine::ReplicaEngine;
use crate::ipc::error::{no_workspace, ok};
use crate::ipc::helpers::{get_required_id, get_required_obj, handle_engine_write, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::ScheduleDraft;
use crate::remote::SqliteRemote;
use serde_json::json;

fn handle_schedules_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return no_workspace(&req.id);
    };
    ok(&req.id, json!({ "schedules": engine.schedules() }))
}

fn schedules_create(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let draft: ScheduleDraft = get_required_obj(params, "schedule")?;
    let saved = engine.create_schedule(&draft)?;
    Ok(json!({ "schedule": saved }))
}

fn schedules_update(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let draft: ScheduleDraft = get_required_obj(params, "schedule")?;
    let saved = engine.update_schedule(&id, &draft)?;
    Ok(json!({ "schedule": saved }))
}

fn schedules_delete(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    engine.delete_schedule(&id)?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.list" => Some(handle_schedules_list(state, req)),
        "schedules.create" => Some(handle_engine_write(state, req, schedules_create)),
        "schedules.update" => Some(handle_engine_write(state, req, schedules_update)),
        "schedules.delete" => Some(handle_engine_write(state, req, schedules_delete)),
        _ => None,
    }
}
