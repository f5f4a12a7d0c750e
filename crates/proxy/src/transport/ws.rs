// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser WebSocket handler.
//!
//! The first frame MUST be an `auth` message carrying a 64-character token;
//! anything else gets one `error` frame and a close. After auth the socket
//! settles into a select loop: outbound session messages flow out, inbound
//! JSON dispatches against the session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{arm_queue_flush, restart_tickers, SessionHandle};
use crate::state::Manager;
use crate::upstream;

/// Tokens are opaque 64-character strings; nothing else is accepted.
pub const TOKEN_LEN: usize = 64;

/// How long the browser gets to send its `auth` frame.
const AUTH_DEADLINE: Duration = Duration::from_secs(10);

/// `GET /ws` — browser WebSocket upgrade.
pub async fn ws_handler(
    State(manager): State<Arc<Manager>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, manager))
}

async fn handle_ws(socket: WebSocket, manager: Arc<Manager>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // -- Auth handshake ------------------------------------------------------
    let first = tokio::time::timeout(AUTH_DEADLINE, ws_rx.next()).await;
    let auth = match first {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str::<ClientMessage>(&text).ok(),
        _ => None,
    };
    let Some(ClientMessage::Auth { token, user_id, character_id, character_name, is_wizard }) =
        auth
    else {
        let _ = send_error(&mut ws_tx, "first message must be auth").await;
        let _ = ws_tx.close().await;
        return;
    };
    if token.len() != TOKEN_LEN {
        let _ = send_error(&mut ws_tx, "invalid token").await;
        let _ = ws_tx.close().await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let outcome = manager
        .authenticate(token, user_id, character_id, character_name, is_wizard, tx)
        .await;
    let session = outcome.session;
    let gen = outcome.gen;
    tracing::debug!(created = outcome.created, "browser attached");

    // -- Main loop -----------------------------------------------------------
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        let Ok(text) = serde_json::to_string(&msg) else { continue };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                        // A displaced browser gets session_taken as its last
                        // frame.
                        if matches!(msg, ServerMessage::SessionTaken) {
                            break;
                        }
                    }
                    // Sender replaced or dropped: this socket lost the slot.
                    None => break,
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if dispatch(&manager, &session, msg).await.is_break() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(err = %e, "unparseable client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "browser WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = ws_tx.close().await;
    let mut s = session.inner.lock().await;
    s.detach_browser(gen);
}

async fn send_error(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &str,
) -> anyhow::Result<()> {
    let msg = ServerMessage::Error { message: message.to_owned() };
    let text = serde_json::to_string(&msg)?;
    ws_tx.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Handle one authenticated client message.
async fn dispatch(
    manager: &Arc<Manager>,
    session: &Arc<SessionHandle>,
    msg: ClientMessage,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    match msg {
        ClientMessage::Auth { .. } => {
            // Re-auth on a live socket is a protocol error; ignore.
            tracing::debug!("duplicate auth frame ignored");
        }
        ClientMessage::Command { command, raw } => {
            let mut s = session.inner.lock().await;
            let queued = s.handle_command(&command, raw);
            if queued {
                arm_queue_flush(session, &mut s);
            }
        }
        ClientMessage::SetTriggers { triggers } => {
            let mut s = session.inner.lock().await;
            s.set_triggers(triggers);
            // In bridge mode the first trigger sync releases the pending
            // resume, so buffered replay runs against a loaded table.
            if s.flags.pending_bridge_resume {
                if let Some(token) = s.bridge_token.clone() {
                    if let Some(client) = manager.bridge.read().await.clone() {
                        client.send(mudlink_bridge::protocol::ProxyToBridge::Resume { token });
                    }
                }
            }
        }
        ClientMessage::SetAliases { aliases } => {
            let mut s = session.inner.lock().await;
            s.set_aliases(aliases);
        }
        ClientMessage::SetTickers { tickers } => {
            let mut s = session.inner.lock().await;
            s.tickers_cfg = tickers;
            restart_tickers(session, &mut s);
        }
        ClientMessage::SetVariables { variables } => {
            let mut s = session.inner.lock().await;
            s.set_variables(variables);
        }
        ClientMessage::SetFunctions { functions } => {
            let mut s = session.inner.lock().await;
            s.functions = functions;
        }
        ClientMessage::SetMip { enabled, mip_id, debug } => {
            let mut s = session.inner.lock().await;
            s.mip.configure(enabled, mip_id, debug);
        }
        ClientMessage::SetDiscordPrefs { channel_prefs, username } => {
            let mut s = session.inner.lock().await;
            let rejected = s.set_discord_prefs(channel_prefs, username);
            for channel in rejected {
                s.emit(ServerMessage::system(format!(
                    "Webhook URL for channel {channel} is not allowed and was ignored."
                )));
            }
        }
        ClientMessage::SetServer { host, port } => {
            if let Err(e) = upstream::connect_session(manager, session, &host, port, None).await {
                tracing::warn!(err = %e, "set_server connect failed");
            }
        }
        ClientMessage::Keepalive => {
            let mut s = session.inner.lock().await;
            s.emit(ServerMessage::KeepaliveAck);
        }
        ClientMessage::HealthCheck => {
            let mut s = session.inner.lock().await;
            s.emit(ServerMessage::HealthOk);
        }
        ClientMessage::Reconnect => {
            let (host, port) = {
                let s = session.inner.lock().await;
                (s.host.clone(), s.port)
            };
            if host.is_empty() {
                let mut s = session.inner.lock().await;
                s.emit(ServerMessage::system("No server selected."));
            } else if let Err(e) =
                upstream::connect_session(manager, session, &host, port, None).await
            {
                tracing::warn!(err = %e, "reconnect failed");
            }
        }
        ClientMessage::TestLine { line } => {
            let mut s = session.inner.lock().await;
            s.process_upstream_line(&line);
        }
        ClientMessage::Disconnect => {
            {
                let mut s = session.inner.lock().await;
                s.flags.explicit_disconnect = true;
                manager.suppress_autologin_for(&s.user_id, &s.character_id);
            }
            upstream::disconnect_session(manager, session).await;
            manager.close_session(session).await;
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}
