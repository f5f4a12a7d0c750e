// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the bridge sidecar.
#[derive(Debug, Clone, clap::Parser)]
pub struct BridgeConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "MUDLINK_BRIDGE_HOST")]
    pub host: String,

    /// Port for the proxy control WebSocket.
    #[arg(long, default_value_t = 3001, env = "MUDLINK_BRIDGE_PORT")]
    pub port: u16,
}
