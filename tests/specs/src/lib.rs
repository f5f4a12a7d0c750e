// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end proxy tests.
//!
//! Runs the real proxy (and optionally the bridge) inside the test process
//! and exercises them over real sockets: raw WebSockets for the browser side,
//! HTTP for the admin surface, and an in-process fake preferences store.

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A 64-character token built from one repeated character.
pub fn token(c: char) -> String {
    std::iter::repeat_n(c, 64).collect()
}

/// Minimal stand-in for the preferences store: empty lists, happy saves.
pub async fn spawn_fake_store() -> anyhow::Result<SocketAddr> {
    let router = Router::new()
        .route(
            "/api/persistent_sessions",
            get(|| async { Json(serde_json::json!({"sessions": []})) })
                .post(|| async { Json(serde_json::json!({"ok": true})) }),
        )
        .route(
            "/api/server_logs",
            get(|| async { Json(serde_json::json!({"logs": []})) })
                .post(|| async { Json(serde_json::json!({"ok": true})) }),
        )
        .route(
            "/api/preferences",
            get(|| async { Json(serde_json::json!({"channelPrefs": {}})) }),
        )
        .route(
            "/api/characters",
            get(|| async { Json(serde_json::json!({"password": "pw"})) }),
        )
        .route("/api/discord_proxy", post(|| async { Json(serde_json::json!({"ok": true})) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

/// Start the proxy on a free port; returns its bound address.
pub async fn start_proxy(admin_key: &str) -> anyhow::Result<SocketAddr> {
    ensure_crypto();
    let store = spawn_fake_store().await?;
    let port = free_port()?;
    let config = mudlink::config::ProxyConfig::parse_from([
        "mudlink",
        "--host",
        "127.0.0.1",
        "--port",
        &port.to_string(),
        "--admin-key",
        admin_key,
        "--store-url",
        &format!("http://{store}"),
    ]);
    tokio::spawn(async move {
        if let Err(e) = mudlink::run(config).await {
            eprintln!("proxy exited: {e:#}");
        }
    });

    let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;
    wait_for_port(addr).await?;
    Ok(addr)
}

async fn wait_for_port(addr: SocketAddr) -> anyhow::Result<()> {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    anyhow::bail!("{addr} never came up")
}

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a browser WebSocket to the proxy.
pub async fn ws_connect(addr: SocketAddr) -> anyhow::Result<WsClient> {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await?;
    Ok(ws)
}

/// Send one JSON value as a text frame.
pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) -> anyhow::Result<()> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

/// Receive the next text frame as JSON, with a deadline. Returns `None` on
/// close.
pub async fn recv_json(ws: &mut WsClient) -> anyhow::Result<Option<serde_json::Value>> {
    let deadline = Duration::from_secs(5);
    loop {
        let frame = tokio::time::timeout(deadline, ws.next()).await?;
        match frame {
            Some(Ok(Message::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Receive frames until one has the given `type`, returning it. Errors if the
/// socket closes first.
pub async fn recv_until_type(
    ws: &mut WsClient,
    wanted: &str,
) -> anyhow::Result<serde_json::Value> {
    loop {
        match recv_json(ws).await? {
            Some(value) => {
                if value.get("type").and_then(|t| t.as_str()) == Some(wanted) {
                    return Ok(value);
                }
            }
            None => anyhow::bail!("socket closed before a {wanted} frame"),
        }
    }
}

/// Standard auth message for tests.
pub fn auth_msg(tok: &str, user: &str, character: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "auth",
        "token": tok,
        "userId": user,
        "characterId": character,
        "characterName": "Ada",
    })
}
