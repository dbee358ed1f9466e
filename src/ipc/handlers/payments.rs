use crate::engine::ReplicaEngine;
use crate::ipc::error::{no_workspace, ok, ErrorCode};
use crate::ipc::helpers::{get_optional_str, get_required_id, get_required_obj, handle_engine_write, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{EntityId, PaymentDraft};
use crate::remote::SqliteRemote;
use serde_json::json;

fn handle_payments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut rows = engine.payments();
    if let Some(who) = get_optional_str(&req.params, "enrolleeId") {
        let who = EntityId::from(who);
        rows.retain(|p| p.payment.enrollee_id == who);
    }
    ok(&req.id, json!({ "payments": rows }))
}

fn payments_create(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let draft: PaymentDraft = get_required_obj(params, "payment")?;
    if engine.replica().enrollees().get(&draft.enrollee_id).is_none() {
        return Err(HandlerErr {
            code: ErrorCode::NotFound,
            message: format!("enrollee {} not found", draft.enrollee_id),
            details: None,
        });
    }
    let saved = engine.create_payment(&draft)?;
    Ok(json!({ "payment": saved }))
}

fn payments_delete(
    engine: &mut ReplicaEngine<SqliteRemote>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    engine.delete_payment(&id)?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.list" => Some(handle_payments_list(state, req)),
        "payments.create" => Some(handle_engine_write(state, req, payments_create)),
        "payments.delete" => Some(handle_engine_write(state, req, payments_delete)),
        _ => None,
    }
}
