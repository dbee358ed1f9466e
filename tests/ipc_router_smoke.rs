mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, spawn_sidecar, spawn_sidecar_with, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("studiod-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with(&["--today=2024-02-15"]);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);
    assert_eq!(health["today"], "2024-02-15");

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let db_file = workspace.join("studio.sqlite3");
    assert!(db_file.is_file());
    assert_eq!(selected["dbPath"], db_file.to_string_lossy().as_ref());

    let methods: &[(&str, serde_json::Value)] = &[
        ("sync.status", json!({})),
        ("sync.pump", json!({})),
        ("sync.refresh", json!({})),
        ("sync.reopen", json!({})),
        ("enrollees.list", json!({})),
        ("payments.list", json!({})),
        ("schedules.list", json!({})),
        ("calendar.month", json!({ "month": "2024-02" })),
        ("calendar.week", json!({ "date": "2024-02-15" })),
        ("validity.check", json!({ "lastPaymentDate": null })),
        ("stats.month", json!({ "month": "2024-02" })),
        ("sync.close", json!({})),
    ];
    for (i, (method, params)) in methods.iter().enumerate() {
        let id = format!("m{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, params.clone());
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
    }

    let code = request_err(&mut stdin, &mut reader, "3", "nope.method", json!({}));
    assert_eq!(code, "not_implemented");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, method) in [
        "sync.status",
        "sync.pump",
        "sync.refresh",
        "sync.reopen",
        "sync.close",
        "enrollees.list",
        "enrollees.create",
        "payments.list",
        "payments.create",
        "schedules.list",
        "schedules.delete",
        "stats.month",
    ]
    .iter()
    .enumerate()
    {
        let code = request_err(&mut stdin, &mut reader, &i.to_string(), method, json!({}));
        assert_eq!(code, "no_workspace", "{}", method);
    }

    // Pure views work without one.
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "g",
        "calendar.month",
        json!({ "year": 2024, "month": 2, "today": "2024-02-29" }),
    );
    assert_eq!(grid["title"], "Febrero 2024");
    assert_eq!(grid["weeks"].as_array().map(|w| w.len()), Some(5));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_lines_and_params_get_error_replies() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "bad_json");

    let code = request_err(&mut stdin, &mut reader, "1", "workspace.select", json!({}));
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "calendar.month",
        json!({ "month": "2024-13" }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "calendar.week",
        json!({ "date": "15/02/2024" }),
    );
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn huge_month_offsets_are_rejected_without_killing_the_sidecar() {
    let workspace = temp_dir("studiod-month-offset");
    let (mut child, mut stdin, mut reader) = spawn_sidecar_with(&["--today=2024-02-15"]);

    for (i, offset) in [2_147_483_000_i64, -2_147_483_000, 5_000_000_000].iter().enumerate() {
        let code = request_err(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "calendar.month",
            json!({ "month": "2024-02", "offset": offset }),
        );
        assert_eq!(code, "bad_params", "offset {}", offset);
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "s",
        "stats.month",
        json!({ "month": "2024-02", "offset": 2_147_483_000_i64 }),
    );
    assert_eq!(code, "bad_params");

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "ok",
        "calendar.month",
        json!({ "month": "2024-02", "offset": 1 }),
    );
    assert_eq!(grid["title"], "Marzo 2024");
    let health = request_ok(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(health["today"], "2024-02-15");

    drop(stdin);
    let _ = child.wait();
}
