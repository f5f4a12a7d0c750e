// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge-mode upstream: the bridge sidecar owns the TCP sockets; the proxy
//! speaks to it over one control WebSocket.
//!
//! The control link reconnects with backoff. After every reconnect the
//! client re-resumes each routed token so the bridge replays whatever it
//! buffered while the proxy was away.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use mudlink_bridge::protocol::{BridgeToProxy, ProxyToBridge};

use crate::protocol::ServerMessage;
use crate::session::handle_upstream_chunk;
use crate::state::Manager;

/// Handle to the bridge control link, shared by every bridge-mode session.
pub struct BridgeClient {
    pub tx: mpsc::UnboundedSender<ProxyToBridge>,
    cancel: CancellationToken,
}

impl BridgeClient {
    pub fn send(&self, cmd: ProxyToBridge) {
        let _ = self.tx.send(cmd);
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn the control-link task.
pub fn spawn(manager: Arc<Manager>, url: String) -> Arc<BridgeClient> {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = manager.shutdown.child_token();
    let client = Arc::new(BridgeClient { tx, cancel: cancel.clone() });
    tokio::spawn(run_loop(manager, url, cancel, rx));
    client
}

async fn run_loop(
    manager: Arc<Manager>,
    url: String,
    cancel: CancellationToken,
    mut outgoing: mpsc::UnboundedReceiver<ProxyToBridge>,
) {
    let mut backoff_ms = 100u64;
    let max_backoff_ms = 5000u64;
    let mut ever_connected = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => {
                backoff_ms = 100;
                tracing::info!(url = %url, "bridge control link connected");
                manager.events.push("bridge_connect", url.clone());
                let (mut write, mut read) = ws_stream.split();

                // After a drop the bridge was buffering; re-attach every
                // routed token so it replays.
                if ever_connected {
                    let routes: Vec<String> =
                        manager.bridge_routes.read().await.keys().cloned().collect();
                    for token in routes {
                        let frame = ProxyToBridge::Resume { token };
                        if let Ok(text) = serde_json::to_string(&frame) {
                            let _ = write.send(Message::Text(text.into())).await;
                        }
                    }
                }
                ever_connected = true;

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,

                        cmd = outgoing.recv() => {
                            match cmd {
                                Some(cmd) => {
                                    let Ok(text) = serde_json::to_string(&cmd) else { continue };
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                                None => return,
                            }
                        }

                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<BridgeToProxy>(&text) {
                                        Ok(frame) => handle_frame(&manager, frame).await,
                                        Err(e) => tracing::warn!(err = %e, "bad bridge frame"),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(e)) => {
                                    tracing::debug!(err = %e, "bridge WS error");
                                    break;
                                }
                                _ => {}
                            }
                        }
                    }
                }
                tracing::warn!("bridge control link lost, reconnecting");
                manager.events.push("bridge_disconnect", "control link lost");
            }
            Err(e) => {
                tracing::debug!(err = %e, backoff_ms, "bridge connect failed, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)) => {}
        }
        backoff_ms = (backoff_ms * 2).min(max_backoff_ms);
    }
}

async fn handle_frame(manager: &Arc<Manager>, frame: BridgeToProxy) {
    let token = match &frame {
        BridgeToProxy::Connected { token }
        | BridgeToProxy::Data { token, .. }
        | BridgeToProxy::Buffered { token, .. }
        | BridgeToProxy::Close { token }
        | BridgeToProxy::End { token }
        | BridgeToProxy::Error { token, .. } => token.clone(),
    };
    let Some(handle) = manager.bridge_routes.read().await.get(&token).map(Arc::clone) else {
        tracing::debug!(token_tail = %tail(&token), "bridge frame for unknown token");
        return;
    };

    match frame {
        BridgeToProxy::Connected { .. } => {
            let mut s = handle.inner.lock().await;
            s.upstream_connected = true;
            s.flags.pending_bridge_resume = false;
            s.emit(ServerMessage::system_status("Game connection established."));
        }
        BridgeToProxy::Data { data, .. } => match BASE64.decode(&data) {
            Ok(bytes) => handle_upstream_chunk(&handle, &bytes).await,
            Err(e) => tracing::warn!(err = %e, "bad base64 from bridge"),
        },
        BridgeToProxy::Buffered { count, .. } => {
            if count > 0 {
                tracing::info!(count, "bridge replaying buffered chunks");
            }
            let mut s = handle.inner.lock().await;
            s.upstream_connected = true;
            s.flags.pending_bridge_resume = false;
        }
        BridgeToProxy::Close { .. } | BridgeToProxy::End { .. } => {
            let explicit = {
                let mut s = handle.inner.lock().await;
                s.upstream = None;
                s.upstream_connected = false;
                if !s.flags.explicit_disconnect && !s.flags.server_restarting {
                    s.emit(ServerMessage::system("Connection to the game server closed."));
                }
                s.flags.explicit_disconnect
            };
            manager.bridge_routes.write().await.remove(&token);
            if explicit {
                manager.close_session(&handle).await;
            }
        }
        BridgeToProxy::Error { message, .. } => {
            let mut s = handle.inner.lock().await;
            if !s.flags.server_restarting {
                s.emit(ServerMessage::system(format!("Game connection error: {message}")));
            }
        }
    }
}

/// Last few characters of a token for log lines; char-boundary safe since
/// tokens are opaque client input.
fn tail(token: &str) -> &str {
    token.char_indices().rev().nth(5).map_or(token, |(i, _)| &token[i..])
}
