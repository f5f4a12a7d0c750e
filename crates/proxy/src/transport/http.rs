// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin HTTP surface.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::logbuf::merge_events;
use crate::state::Manager;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
    pub bridge_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: String,
    pub character_name: String,
    pub server: String,
    pub mud_connected: bool,
    pub browser_connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub persisted: bool,
    #[serde(rename = "type")]
    pub type_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

/// `GET /` — minimal status page.
pub async fn index(State(m): State<Arc<Manager>>) -> impl IntoResponse {
    let count = m.session_count().await;
    Html(format!(
        "<!doctype html><html><head><title>mudlink</title></head>\
         <body><h1>mudlink</h1><p>{count} session(s) active.</p></body></html>"
    ))
}

/// `GET /health` — JSON liveness.
pub async fn health(State(m): State<Arc<Manager>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        session_count: m.session_count().await,
        bridge_mode: m.config.bridge_mode(),
    })
}

/// `GET /sessions` — summary of every live session.
pub async fn sessions(State(m): State<Arc<Manager>>) -> impl IntoResponse {
    let handles: Vec<_> = m.sessions.read().await.values().map(Arc::clone).collect();
    let mut list = Vec::with_capacity(handles.len());
    for handle in handles {
        let s = handle.inner.lock().await;
        list.push(SessionInfo {
            user_id: s.user_id.clone(),
            character_name: s.character_name.clone(),
            server: crate::config::allowed_server(&s.host, s.port)
                .map(|t| t.label.to_owned())
                .unwrap_or_default(),
            mud_connected: s.upstream_live(),
            browser_connected: s.browser_attached(),
        });
    }
    Json(list)
}

/// `GET /logs?persisted=bool&type=PREFIX` — recent structured events,
/// optionally merged with the persisted set.
pub async fn logs(
    State(m): State<Arc<Manager>>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let memory = m.events.recent(query.type_prefix.as_deref());
    if !query.persisted {
        return Json(memory);
    }
    let persisted = match m.store.list_logs().await {
        Ok(logs) => logs,
        Err(e) => {
            tracing::warn!(err = %e, "fetching persisted logs failed");
            m.events.push("store_error", format!("list_logs failed: {e}"));
            Vec::new()
        }
    };
    let persisted = match query.type_prefix.as_deref() {
        Some(prefix) => {
            persisted.into_iter().filter(|e| e.event_type.starts_with(prefix)).collect()
        }
        None => persisted,
    };
    Json(merge_events(memory, persisted))
}

/// `POST /broadcast` — system message to every attached browser.
pub async fn broadcast(
    State(m): State<Arc<Manager>>,
    Json(req): Json<BroadcastRequest>,
) -> impl IntoResponse {
    let delivered = m.broadcast(&req.message).await;
    m.events.push("broadcast", req.message);
    Json(BroadcastResponse { delivered })
}
