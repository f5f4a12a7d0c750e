// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the proxy.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::Manager;

/// Build the axum `Router` with all proxy routes.
pub fn build_router(state: Arc<Manager>) -> Router {
    Router::new()
        // Status + health (no auth)
        .route("/", get(http::index))
        .route("/health", get(http::health))
        // Admin surface
        .route("/sessions", get(http::sessions))
        .route("/logs", get(http::logs))
        .route("/broadcast", post(http::broadcast))
        // Browser WebSocket
        .route("/ws", get(ws::ws_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
