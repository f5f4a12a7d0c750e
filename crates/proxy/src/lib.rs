// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mudlink: stateful WebSocket-to-telnet proxy for a text-based game.
//!
//! Browser clients speak JSON over a WebSocket; the proxy holds the telnet
//! connection to the game, keeps sessions alive across browser disconnects
//! and proxy restarts, and runs the user's triggers, aliases, and tickers
//! server-side so scripting survives a closed laptop lid.

pub mod config;
pub mod error;
pub mod logbuf;
pub mod pattern;
pub mod persist;
pub mod pipeline;
pub mod protocol;
pub mod scripting;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::state::{spawn_idle_sweeper, Manager};
use crate::transport::build_router;

/// Run the proxy until shutdown.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    // reqwest/rustls need a process-wide crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let manager = Arc::new(Manager::new(config.clone(), shutdown.clone()));

    if let Some(url) = config.bridge_url.clone() {
        let client = upstream::bridge::spawn(Arc::clone(&manager), url);
        *manager.bridge.write().await = Some(client);
        tracing::info!("bridge mode enabled");
    }

    spawn_idle_sweeper(Arc::clone(&manager));
    persist::spawn_log_flusher(Arc::clone(&manager));
    persist::spawn_restore(Arc::clone(&manager));

    let router = build_router(Arc::clone(&manager));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("mudlink listening on {addr}");

    let signal_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        wait_for_signal().await;
        persist::shutdown(&signal_manager).await;
        signal_manager.shutdown.cancel();
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
