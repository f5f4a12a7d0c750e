// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against a live proxy over real sockets.

use mudlink_specs::*;
use serde_json::json;

#[tokio::test]
async fn short_token_gets_error_then_close() {
    let addr = start_proxy("adminkey").await.unwrap();
    let mut ws = ws_connect(addr).await.unwrap();

    send_json(&mut ws, auth_msg("short", "u1", "c1")).await.unwrap();
    let frame = recv_json(&mut ws).await.unwrap().unwrap();
    assert_eq!(frame["type"], "error");
    // Socket closes after the single error frame.
    assert!(recv_json(&mut ws).await.unwrap().is_none());
}

#[tokio::test]
async fn non_auth_first_message_rejected() {
    let addr = start_proxy("adminkey").await.unwrap();
    let mut ws = ws_connect(addr).await.unwrap();

    send_json(&mut ws, json!({"type": "command", "command": "look"})).await.unwrap();
    let frame = recv_json(&mut ws).await.unwrap().unwrap();
    assert_eq!(frame["type"], "error");
    assert!(recv_json(&mut ws).await.unwrap().is_none());
}

#[tokio::test]
async fn fresh_auth_yields_session_new_and_acks() {
    let addr = start_proxy("adminkey").await.unwrap();
    let mut ws = ws_connect(addr).await.unwrap();

    send_json(&mut ws, auth_msg(&token('a'), "u1", "c1")).await.unwrap();
    let frame = recv_json(&mut ws).await.unwrap().unwrap();
    assert_eq!(frame["type"], "session_new");

    send_json(&mut ws, json!({"type": "keepalive"})).await.unwrap();
    let frame = recv_until_type(&mut ws, "keepalive_ack").await.unwrap();
    assert_eq!(frame["type"], "keepalive_ack");

    send_json(&mut ws, json!({"type": "health_check"})).await.unwrap();
    recv_until_type(&mut ws, "health_ok").await.unwrap();
}

#[tokio::test]
async fn same_token_second_device_takes_over() {
    let addr = start_proxy("adminkey").await.unwrap();
    let tok = token('b');

    let mut first = ws_connect(addr).await.unwrap();
    send_json(&mut first, auth_msg(&tok, "u1", "c1")).await.unwrap();
    recv_until_type(&mut first, "session_new").await.unwrap();

    let mut second = ws_connect(addr).await.unwrap();
    send_json(&mut second, auth_msg(&tok, "u1", "c1")).await.unwrap();
    recv_until_type(&mut second, "session_resumed").await.unwrap();

    let frame = recv_until_type(&mut first, "session_taken").await.unwrap();
    assert_eq!(frame["type"], "session_taken");
    assert!(recv_json(&mut first).await.unwrap().is_none());
}

#[tokio::test]
async fn rekey_same_character_under_new_token() {
    let addr = start_proxy("adminkey").await.unwrap();

    let mut first = ws_connect(addr).await.unwrap();
    send_json(&mut first, auth_msg(&token('c'), "u1", "c1")).await.unwrap();
    recv_until_type(&mut first, "session_new").await.unwrap();

    // Same user+character, brand-new token (new device).
    let mut second = ws_connect(addr).await.unwrap();
    send_json(&mut second, auth_msg(&token('d'), "u1", "c1")).await.unwrap();
    let frame = recv_until_type(&mut second, "session_resumed").await.unwrap();
    assert_eq!(frame["mudConnected"], false);

    recv_until_type(&mut first, "session_taken").await.unwrap();
}

#[tokio::test]
async fn test_line_runs_trigger_pipeline() {
    let addr = start_proxy("adminkey").await.unwrap();
    let mut ws = ws_connect(addr).await.unwrap();
    send_json(&mut ws, auth_msg(&token('e'), "u1", "c1")).await.unwrap();
    recv_until_type(&mut ws, "session_new").await.unwrap();

    send_json(
        &mut ws,
        json!({"type": "set_triggers", "triggers": [
            {"id": "hl", "pattern": "ally", "actions": [
                {"type": "highlight", "fgColor": "#00ff00"}
            ]},
            {"id": "gag", "pattern": "hidden", "actions": [{"type": "gag"}]}
        ]}),
    )
    .await
    .unwrap();

    send_json(&mut ws, json!({"type": "test_line", "line": "your ally arrives"}))
        .await
        .unwrap();
    let frame = recv_until_type(&mut ws, "mud").await.unwrap();
    let line = frame["line"].as_str().unwrap();
    assert!(line.contains("<span"), "highlight markup missing: {line}");
    assert_eq!(frame["highlight"], true);

    // A gagged line produces no mud frame; prove it by racing a keepalive.
    send_json(&mut ws, json!({"type": "test_line", "line": "hidden thing"})).await.unwrap();
    send_json(&mut ws, json!({"type": "keepalive"})).await.unwrap();
    let frame = recv_json(&mut ws).await.unwrap().unwrap();
    assert_eq!(frame["type"], "keepalive_ack");
}

#[tokio::test]
async fn chatmon_survives_reconnect_via_chat_ring() {
    let addr = start_proxy("adminkey").await.unwrap();
    let tok = token('f');

    let mut ws = ws_connect(addr).await.unwrap();
    send_json(&mut ws, auth_msg(&tok, "u1", "c1")).await.unwrap();
    recv_until_type(&mut ws, "session_new").await.unwrap();

    send_json(
        &mut ws,
        json!({"type": "set_triggers", "triggers": [
            {"id": "cm", "pattern": "%w tells you: %*", "actions": [
                {"type": "chatmon", "message": "%0", "channel": "tells"}
            ]}
        ]}),
    )
    .await
    .unwrap();

    send_json(&mut ws, json!({"type": "test_line", "line": "Bob tells you: hi"}))
        .await
        .unwrap();
    let frame = recv_until_type(&mut ws, "trigger_chatmon").await.unwrap();
    assert_eq!(frame["channel"], "tells");

    // Drop the browser, reattach with the same token: the chat ring replays.
    drop(ws);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let mut ws = ws_connect(addr).await.unwrap();
    send_json(&mut ws, auth_msg(&tok, "u1", "c1")).await.unwrap();
    recv_until_type(&mut ws, "session_resumed").await.unwrap();
    let frame = recv_until_type(&mut ws, "trigger_chatmon").await.unwrap();
    assert_eq!(frame["message"], "Bob tells you: hi");
}

#[tokio::test]
async fn admin_surface_requires_key() {
    ensure_crypto();
    let addr = start_proxy("sekrit").await.unwrap();
    let client = reqwest::Client::new();

    // Health is open.
    let resp = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert!(resp.status().is_success());

    // Sessions requires the key.
    let resp = client.get(format!("http://{addr}/sessions")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("http://{addr}/sessions"))
        .header("X-Admin-Key", "sekrit")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let list: serde_json::Value = resp.json().await.unwrap();
    assert!(list.is_array());
}

#[tokio::test]
async fn broadcast_reaches_browser() {
    ensure_crypto();
    let addr = start_proxy("sekrit").await.unwrap();

    let mut ws = ws_connect(addr).await.unwrap();
    send_json(&mut ws, auth_msg(&token('g'), "u1", "c1")).await.unwrap();
    recv_until_type(&mut ws, "session_new").await.unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/broadcast"))
        .header("X-Admin-Key", "sekrit")
        .json(&json!({"message": "reboot in 5"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let frame = recv_until_type(&mut ws, "broadcast").await.unwrap();
    assert_eq!(frame["message"], "reboot in 5");
    assert!(frame["timestamp"].as_u64().is_some());
}

#[tokio::test]
async fn explicit_disconnect_closes_session() {
    ensure_crypto();
    let addr = start_proxy("sekrit").await.unwrap();
    let tok = token('h');

    let mut ws = ws_connect(addr).await.unwrap();
    send_json(&mut ws, auth_msg(&tok, "u9", "c9")).await.unwrap();
    recv_until_type(&mut ws, "session_new").await.unwrap();

    send_json(&mut ws, json!({"type": "disconnect"})).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    // The session is gone: a fresh auth with the same token starts new.
    let mut ws = ws_connect(addr).await.unwrap();
    send_json(&mut ws, auth_msg(&tok, "u9", "c9")).await.unwrap();
    recv_until_type(&mut ws, "session_new").await.unwrap();
}
