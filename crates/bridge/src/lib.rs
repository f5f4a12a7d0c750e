// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mudlink-bridge: out-of-process holder for upstream game sockets.
//!
//! The proxy opens TCP connections to the game through this sidecar. When the
//! proxy restarts, the bridge keeps every upstream socket open and buffers
//! inbound bytes; the new proxy process resumes each token and replays the
//! buffer, so players never linkdeath through a deploy.

pub mod config;
pub mod protocol;
pub mod relay;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::relay::RelayState;

/// Run the bridge until shutdown.
pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state = Arc::new(RelayState::new(shutdown.clone()));

    let router = relay::build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("mudlink-bridge listening on {addr}");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}
