// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token → upstream TCP socket relay.
//!
//! One proxy control WebSocket at a time drives the relay. Each `init` opens
//! a TCP socket to the game and keeps it alive independent of the control
//! connection: while no proxy is attached, upstream bytes accumulate in a
//! bounded per-token buffer and are replayed, in order, when the proxy
//! resumes the token.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::protocol::{BridgeToProxy, ProxyToBridge};

/// Buffered upstream chunks per detached token, head-dropped beyond this.
pub const BUFFER_CAP: usize = 500;

/// Per-token buffering state, also the attach gate: the lock serializes
/// buffered replay against live reads so order is preserved across a resume.
#[derive(Debug, Default)]
struct Gate {
    chunks: VecDeque<String>,
    attached: bool,
    connected: bool,
}

/// One held upstream connection.
pub struct Entry {
    pub token: String,
    pub host: String,
    pub port: u16,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    gate: Mutex<Gate>,
    cancel: CancellationToken,
}

/// Shared relay state.
pub struct RelayState {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    control: RwLock<Option<mpsc::UnboundedSender<String>>>,
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { entries: RwLock::new(HashMap::new()), control: RwLock::new(None), shutdown }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Send a frame to the attached proxy. Returns false when detached.
    async fn send_control(&self, msg: &BridgeToProxy) -> bool {
        let guard = self.control.read().await;
        let Some(ref tx) = *guard else {
            return false;
        };
        match serde_json::to_string(msg) {
            Ok(text) => tx.send(text).is_ok(),
            Err(_) => false,
        }
    }
}

pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Control WebSocket upgrade. A new proxy connection displaces the old one.
pub async fn ws_handler(
    State(state): State<Arc<RelayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_control(socket, state))
}

async fn handle_control(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    *state.control.write().await = Some(tx);
    tracing::info!("proxy control connection attached");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ProxyToBridge>(&text) {
                            Ok(cmd) => dispatch(&state, cmd).await,
                            Err(e) => tracing::warn!(err = %e, "bad control frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "control WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // The proxy went away: detach every entry and start buffering. Upstream
    // sockets stay open.
    *state.control.write().await = None;
    let entries = state.entries.read().await;
    for entry in entries.values() {
        entry.gate.lock().await.attached = false;
    }
    tracing::info!(held = entries.len(), "proxy control connection detached, buffering");
}

async fn dispatch(state: &Arc<RelayState>, cmd: ProxyToBridge) {
    match cmd {
        ProxyToBridge::Init { token, host, port } => {
            // Tear down any prior entry for this token.
            if let Some(old) = state.entries.write().await.remove(&token) {
                old.cancel.cancel();
            }
            spawn_entry(state, token, host, port).await;
        }
        ProxyToBridge::Data { token, data } => {
            let entries = state.entries.read().await;
            let Some(entry) = entries.get(&token) else {
                return;
            };
            match BASE64.decode(&data) {
                Ok(bytes) => {
                    let _ = entry.write_tx.send(bytes);
                }
                Err(e) => tracing::warn!(token = %token, err = %e, "bad base64 in data frame"),
            }
        }
        ProxyToBridge::Resume { token } => {
            let entry = state.entries.read().await.get(&token).map(Arc::clone);
            let Some(entry) = entry else {
                let _ = state
                    .send_control(&BridgeToProxy::Error {
                        token,
                        message: "unknown token".to_owned(),
                    })
                    .await;
                return;
            };
            let mut gate = entry.gate.lock().await;
            let count = gate.chunks.len();
            let _ = state.send_control(&BridgeToProxy::Buffered { token: token.clone(), count }).await;
            for data in gate.chunks.drain(..) {
                let _ = state.send_control(&BridgeToProxy::Data { token: token.clone(), data }).await;
            }
            gate.attached = true;
            if gate.connected {
                drop(gate);
                let _ = state.send_control(&BridgeToProxy::Connected { token }).await;
            }
        }
        ProxyToBridge::Destroy { token } => {
            if let Some(entry) = state.entries.write().await.remove(&token) {
                entry.cancel.cancel();
                tracing::info!(token = %entry.token, "entry destroyed");
            }
        }
    }
}

async fn spawn_entry(state: &Arc<RelayState>, token: String, host: String, port: u16) {
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let cancel = state.shutdown.child_token();
    let entry = Arc::new(Entry {
        token: token.clone(),
        host: host.clone(),
        port,
        write_tx,
        gate: Mutex::new(Gate { chunks: VecDeque::new(), attached: true, connected: false }),
        cancel: cancel.clone(),
    });
    state.entries.write().await.insert(token.clone(), Arc::clone(&entry));

    let state = Arc::clone(state);
    tokio::spawn(async move {
        match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => {
                entry.gate.lock().await.connected = true;
                let _ = state.send_control(&BridgeToProxy::Connected { token: token.clone() }).await;
                run_entry(&state, &entry, stream, write_rx).await;
            }
            Err(e) => {
                tracing::warn!(token = %token, err = %e, "upstream connect failed");
                let _ = state
                    .send_control(&BridgeToProxy::Error { token: token.clone(), message: e.to_string() })
                    .await;
                state.entries.write().await.remove(&token);
            }
        }
    });
}

async fn run_entry(
    state: &Arc<RelayState>,
    entry: &Arc<Entry>,
    stream: TcpStream,
    mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let token = entry.token.clone();
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            _ = entry.cancel.cancelled() => {
                // Clean FIN so the game sees a deliberate quit, not linkdeath.
                let _ = write_half.shutdown().await;
                break;
            }

            cmd = write_rx.recv() => {
                match cmd {
                    Some(bytes) => {
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = write_half.shutdown().await;
                        break;
                    }
                }
            }

            n = read_half.read(&mut buf) => {
                match n {
                    Ok(0) => {
                        let _ = state.send_control(&BridgeToProxy::End { token: token.clone() }).await;
                        break;
                    }
                    Ok(n) => {
                        let data = BASE64.encode(&buf[..n]);
                        let mut gate = entry.gate.lock().await;
                        if gate.attached {
                            let sent = state
                                .send_control(&BridgeToProxy::Data { token: token.clone(), data: data.clone() })
                                .await;
                            if !sent {
                                gate.attached = false;
                                push_chunk(&mut gate.chunks, data);
                            }
                        } else {
                            push_chunk(&mut gate.chunks, data);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(token = %token, err = %e, "upstream read error");
                        let _ = state
                            .send_control(&BridgeToProxy::Error { token: token.clone(), message: e.to_string() })
                            .await;
                        break;
                    }
                }
            }
        }
    }

    let _ = state.send_control(&BridgeToProxy::Close { token: token.clone() }).await;
    state.entries.write().await.remove(&token);
}

fn push_chunk(chunks: &mut VecDeque<String>, data: String) {
    if chunks.len() >= BUFFER_CAP {
        chunks.pop_front();
    }
    chunks.push_back(data);
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
