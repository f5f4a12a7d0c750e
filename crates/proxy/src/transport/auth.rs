// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;
use crate::state::Manager;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate the `X-Admin-Key` header. An empty configured key rejects
/// everything; the admin surface cannot run open.
pub fn validate_admin_key(headers: &HeaderMap, expected: &str) -> Result<(), ProxyError> {
    if expected.is_empty() {
        return Err(ProxyError::Unauthorized);
    }
    let presented = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ProxyError::Unauthorized)?;
    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(ProxyError::Unauthorized)
    }
}

/// Axum middleware enforcing the admin key.
///
/// Exempt: `/`, `/health`, and the browser WebSocket at `/ws` (which runs its
/// own token handshake).
pub async fn auth_layer(
    state: State<Arc<Manager>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/" || path == "/health" || path == "/ws" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(code) = validate_admin_key(req.headers(), &state.config.admin_key) {
        let body = crate::error::ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            axum::Json(body),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
