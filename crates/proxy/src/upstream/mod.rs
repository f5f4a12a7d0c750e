// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream connection management: direct TCP or the bridge sidecar.

pub mod autologin;
pub mod bridge;
pub mod direct;

use std::sync::Arc;

use mudlink_bridge::protocol::ProxyToBridge;

use crate::config::allowed_server;
use crate::protocol::ServerMessage;
use crate::session::{SessionHandle, UpstreamLink};
use crate::state::Manager;
use crate::upstream::autologin::AutoLogin;

/// Open (or re-open) the session's upstream to an allowlisted target.
pub async fn connect_session(
    manager: &Arc<Manager>,
    handle: &Arc<SessionHandle>,
    host: &str,
    port: u16,
    autologin: Option<AutoLogin>,
) -> anyhow::Result<()> {
    let Some(target) = allowed_server(host, port) else {
        let mut s = handle.inner.lock().await;
        s.emit(ServerMessage::system(format!("Server {host}:{port} is not allowed.")));
        anyhow::bail!("server {host}:{port} not in allowlist");
    };

    disconnect_session(manager, handle).await;

    if manager.config.bridge_mode() {
        let client = manager.bridge.read().await.clone();
        let Some(client) = client else {
            anyhow::bail!("bridge mode without a bridge client");
        };
        let token = {
            let mut s = handle.inner.lock().await;
            let token = s.token.clone();
            s.host = target.host.to_owned();
            s.port = target.port;
            s.bridge_token = Some(token.clone());
            s.upstream = Some(UpstreamLink::Bridge { tx: client.tx.clone(), token: token.clone() });
            s.upstream_connected = false;
            s.flags.bridge_mode_init = true;
            token
        };
        manager.bridge_routes.write().await.insert(token.clone(), Arc::clone(handle));
        client.send(ProxyToBridge::Init {
            token,
            host: target.host.to_owned(),
            port: target.port,
        });
        Ok(())
    } else {
        direct::connect(
            Arc::clone(manager),
            Arc::clone(handle),
            target.host.to_owned(),
            target.port,
            autologin,
        )
        .await
    }
}

/// Re-attach a restored session to an upstream the bridge is still holding.
pub async fn resume_bridge_session(
    manager: &Arc<Manager>,
    handle: &Arc<SessionHandle>,
    bridge_token: &str,
) -> anyhow::Result<()> {
    let client = manager.bridge.read().await.clone();
    let Some(client) = client else {
        anyhow::bail!("bridge mode without a bridge client");
    };
    {
        let mut s = handle.inner.lock().await;
        s.bridge_token = Some(bridge_token.to_owned());
        s.upstream = Some(UpstreamLink::Bridge {
            tx: client.tx.clone(),
            token: bridge_token.to_owned(),
        });
        s.upstream_connected = false;
        s.flags.pending_bridge_resume = true;
    }
    manager.bridge_routes.write().await.insert(bridge_token.to_owned(), Arc::clone(handle));
    client.send(ProxyToBridge::Resume { token: bridge_token.to_owned() });
    Ok(())
}

/// Drop the session's current upstream, if any.
pub async fn disconnect_session(manager: &Arc<Manager>, handle: &Arc<SessionHandle>) {
    let bridge_token = {
        let mut s = handle.inner.lock().await;
        s.upstream_connected = false;
        match s.upstream.take() {
            Some(UpstreamLink::Direct { cancel, .. }) => {
                cancel.cancel();
                None
            }
            Some(UpstreamLink::Bridge { tx, token }) => {
                let _ = tx.send(ProxyToBridge::Destroy { token: token.clone() });
                s.bridge_token = None;
                Some(token)
            }
            None => None,
        }
    };
    if let Some(token) = bridge_token {
        manager.bridge_routes.write().await.remove(&token);
    }
}
