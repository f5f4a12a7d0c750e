// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct-mode upstream: the proxy owns the TCP socket to the game.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::pattern::strip_ansi;
use crate::pipeline::telnet;
use crate::protocol::ServerMessage;
use crate::session::{handle_upstream_chunk, SessionHandle, UpstreamLink};
use crate::state::Manager;
use crate::upstream::autologin::{AutoLogin, LoginAction, LOGIN_TIMEOUT};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a direct TCP connection and wire it into the session.
///
/// With `autologin` set, the reader drives the login dialog before the line
/// pipeline takes over; the attempt is destroyed wholesale on failure or
/// after the 30 s login timeout.
pub async fn connect(
    manager: Arc<Manager>,
    handle: Arc<SessionHandle>,
    host: String,
    port: u16,
    autologin: Option<AutoLogin>,
) -> anyhow::Result<()> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| anyhow::anyhow!("connect timeout to {host}:{port}"))??;
    stream.set_nodelay(true).ok();
    let peer = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();

    let (tx, write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let cancel = handle.cancel.child_token();

    {
        let mut s = handle.inner.lock().await;
        if s.flags.closed {
            cancel.cancel();
            anyhow::bail!("session closed during connect");
        }
        s.upstream = Some(UpstreamLink::Direct { tx: tx.clone(), cancel: cancel.clone(), peer });
        s.upstream_connected = true;
        s.host = host.clone();
        s.port = port;
    }

    tokio::spawn(writer_loop(write_half, write_rx, cancel.clone()));
    tokio::spawn(reader_loop(manager, handle, read_half, tx, cancel, autologin));
    Ok(())
}

async fn writer_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // FIN so the game can recognize a deliberate close.
                let _ = write_half.shutdown().await;
                break;
            }
            bytes = write_rx.recv() => {
                match bytes {
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
        }
    }
}

async fn reader_loop(
    manager: Arc<Manager>,
    handle: Arc<SessionHandle>,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    cancel: tokio_util::sync::CancellationToken,
    mut autologin: Option<AutoLogin>,
) {
    let mut buf = vec![0u8; 8192];
    let login_deadline = tokio::time::Instant::now() + LOGIN_TIMEOUT;

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,

            // The login attempt as a whole is hard-bounded.
            _ = tokio::time::sleep_until(login_deadline), if autologin.is_some() => {
                tracing::warn!("auto-login timed out");
                manager.events.push("autologin_timeout", "auto-login timed out");
                cancel.cancel();
                manager.close_session(&handle).await;
                return;
            }

            n = read_half.read(&mut buf) => match n {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(err = %e, "upstream read error");
                    break;
                }
            },
        };

        let chunk = &buf[..n];
        if let Some(al) = autologin.as_mut() {
            let scan = telnet::strip(chunk);
            let text = strip_ansi(&String::from_utf8_lossy(&scan.clean));
            match al.feed(&text) {
                LoginAction::Wait => {}
                LoginAction::Send(line) => {
                    let _ = write_tx.send(format!("{line}\r\n").into_bytes());
                }
                LoginAction::Success => {
                    tracing::info!("auto-login succeeded");
                    manager.events.push("autologin_ok", "auto-login succeeded");
                    autologin = None;
                    // Re-negotiate the sideband channel under a fresh id so
                    // stats and chat keep parsing while the browser is away.
                    {
                        let mut s = handle.inner.lock().await;
                        let mip_id = crate::pipeline::mip::generate_mip_id();
                        s.mip.configure(true, mip_id.clone(), false);
                        s.send_upstream_raw(&format!("3klient {mip_id}~~mudlink"));
                        s.send_upstream_raw("3klient LINEFEED on");
                    }
                    // The success chunk usually carries the welcome text and
                    // sideband init; run it through the normal pipeline.
                    handle_upstream_chunk(&handle, chunk).await;
                }
                LoginAction::Failure(reason) => {
                    tracing::warn!(reason = %reason, "auto-login failed");
                    manager.events.push("autologin_fail", reason);
                    cancel.cancel();
                    manager.close_session(&handle).await;
                    return;
                }
            }
        } else {
            handle_upstream_chunk(&handle, chunk).await;
        }
    }

    on_upstream_closed(&manager, &handle).await;
}

/// The upstream socket is gone: unlink it and either tear the session down
/// (explicit disconnect) or tell the user.
pub async fn on_upstream_closed(manager: &Arc<Manager>, handle: &Arc<SessionHandle>) {
    let explicit = {
        let mut s = handle.inner.lock().await;
        if s.flags.closed {
            return;
        }
        s.upstream = None;
        s.upstream_connected = false;
        if !s.flags.explicit_disconnect && !s.flags.server_restarting {
            s.emit(ServerMessage::system("Connection to the game server closed."));
        }
        s.flags.explicit_disconnect
    };
    if explicit {
        manager.close_session(handle).await;
    }
}
