// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol between proxy and bridge.
//!
//! Both sides speak JSON text frames over a single WebSocket. Upstream socket
//! payloads travel base64-encoded in `data` frames.

use serde::{Deserialize, Serialize};

/// Proxy → bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyToBridge {
    /// Open a fresh TCP socket for a token, tearing down any prior entry.
    Init { token: String, host: String, port: u16 },
    /// Write bytes to the upstream socket.
    Data { token: String, data: String },
    /// Re-attach to an existing entry; the bridge replays its buffer.
    Resume { token: String },
    /// Clean FIN on the upstream socket and drop the entry.
    Destroy { token: String },
}

/// Bridge → proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeToProxy {
    /// The upstream TCP connect for `init` completed.
    Connected { token: String },
    /// Bytes from the upstream socket.
    Data { token: String, data: String },
    /// Announces how many buffered `data` frames follow a `resume`.
    Buffered { token: String, count: usize },
    /// The upstream socket closed.
    Close { token: String },
    /// The upstream socket half-closed (FIN from the game).
    End { token: String },
    /// Connect or socket error.
    Error { token: String, message: String },
}
