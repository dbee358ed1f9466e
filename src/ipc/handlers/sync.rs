use crate::ipc::error::{no_workspace, ok};
use crate::ipc::helpers::HandlerErr;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_sync_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return no_workspace(&req.id);
    };
    ok(&req.id, json!(engine.status()))
}

fn handle_sync_pump(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_mut() else {
        return no_workspace(&req.id);
    };
    let applied = engine.pump();
    ok(&req.id, json!({ "applied": applied, "status": engine.status() }))
}

/// Full reload from the remote, then restore any feed that went away.
fn handle_sync_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_mut() else {
        return no_workspace(&req.id);
    };
    let result = engine.load_all().and_then(|loaded| {
        engine.open_feeds()?;
        Ok(loaded)
    });
    match result {
        Ok(loaded) => ok(&req.id, json!({ "loaded": loaded, "status": engine.status() })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_sync_reopen(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_mut() else {
        return no_workspace(&req.id);
    };
    match engine.reopen_feeds() {
        Ok(()) => ok(&req.id, json!(engine.status())),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_sync_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.take() else {
        return no_workspace(&req.id);
    };
    state.workspace = None;
    match engine.close() {
        Ok(()) => ok(&req.id, json!({ "closed": true })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync.status" => Some(handle_sync_status(state, req)),
        "sync.pump" => Some(handle_sync_pump(state, req)),
        "sync.refresh" => Some(handle_sync_refresh(state, req)),
        "sync.reopen" => Some(handle_sync_reopen(state, req)),
        "sync.close" => Some(handle_sync_close(state, req)),
        _ => None,
    }
}
