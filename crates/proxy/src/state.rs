// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared proxy state: the token map, the user+character ownership map, and
//! the binding rules that keep exactly one session per character.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::logbuf::LogBuffer;
use crate::protocol::ServerMessage;
use crate::session::{Session, SessionHandle};
use crate::store::StoreClient;
use crate::upstream::bridge::BridgeClient;

/// How long an explicit disconnect suppresses boot-time auto-login for the
/// same character.
pub const SUPPRESS_AUTOLOGIN_FOR: Duration = Duration::from_secs(60);

/// Sweep cadence for idle sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Manager {
    /// token → session.
    pub sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    /// (userId, characterId) → token. Single-owner invariant lives here.
    pub by_character: RwLock<HashMap<(String, String), String>>,
    /// Bridge-side token → session, for routing inbound bridge frames.
    pub bridge_routes: RwLock<HashMap<String, Arc<SessionHandle>>>,
    pub bridge: RwLock<Option<Arc<BridgeClient>>>,
    pub store: StoreClient,
    pub events: Arc<LogBuffer>,
    pub config: ProxyConfig,
    pub shutdown: CancellationToken,
    /// Characters whose boot-time auto-login is suppressed until a deadline.
    pub suppress_autologin: parking_lot::Mutex<HashMap<(String, String), Instant>>,
}

/// What an auth handshake did. The handshake reply (`session_new` or
/// `session_resumed`) is pushed into the browser channel ahead of the
/// reattach replay, so the browser always sees it first.
pub struct AuthOutcome {
    pub session: Arc<SessionHandle>,
    pub gen: u64,
    pub created: bool,
}

impl Manager {
    pub fn new(config: ProxyConfig, shutdown: CancellationToken) -> Self {
        let store = StoreClient::new(config.store_url.clone(), config.admin_key.clone());
        Self {
            sessions: RwLock::new(HashMap::new()),
            by_character: RwLock::new(HashMap::new()),
            bridge_routes: RwLock::new(HashMap::new()),
            bridge: RwLock::new(None),
            store,
            events: Arc::new(LogBuffer::new()),
            config,
            shutdown,
            suppress_autologin: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn get(&self, token: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(token).map(Arc::clone)
    }

    /// Apply the binding rules for an authenticated browser.
    ///
    /// 1. Same character under a different token → re-key: state (and any
    ///    live upstream) moves under the new token, the old browser is
    ///    displaced.
    /// 2. Same token with a live browser → displace that browser.
    /// 3. Same token, no browser → pure resume.
    /// 4. Otherwise → new session.
    pub async fn authenticate(
        &self,
        token: String,
        user_id: String,
        character_id: String,
        character_name: Option<String>,
        is_wizard: bool,
        browser_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> AuthOutcome {
        let key = (user_id.clone(), character_id.clone());
        let mut sessions = self.sessions.write().await;
        let mut by_character = self.by_character.write().await;

        let existing_token = by_character.get(&key).cloned();
        if let Some(old_token) = existing_token {
            if old_token != token {
                if let Some(handle) = sessions.remove(&old_token) {
                    // Re-key: same character from a new browser/token.
                    sessions.insert(token.clone(), Arc::clone(&handle));
                    by_character.insert(key, token.clone());
                    drop(sessions);
                    drop(by_character);

                    let mut s = handle.inner.lock().await;
                    s.token = token;
                    if let Some(old_browser) = s.browser.take() {
                        let _ = old_browser.send(ServerMessage::SessionTaken);
                    }
                    if let Some(name) = character_name {
                        s.character_name = name;
                    }
                    s.is_wizard = is_wizard;
                    let _ = browser_tx.send(ServerMessage::SessionResumed {
                        mud_connected: s.upstream_live(),
                        variables: s.vars.snapshot(),
                    });
                    let gen = s.attach_browser(browser_tx);
                    drop(s);

                    self.events.push("session_rekey", format!("{user_id}/{character_id}"));
                    tracing::info!(user_id = %user_id, character_id = %character_id, "session re-keyed");
                    return AuthOutcome { session: handle, gen, created: false };
                }
                by_character.remove(&key);
            }
        }

        if let Some(handle) = sessions.get(&token).map(Arc::clone) {
            drop(sessions);
            drop(by_character);
            let mut s = handle.inner.lock().await;
            if let Some(old_browser) = s.browser.take() {
                let _ = old_browser.send(ServerMessage::SessionTaken);
            }
            let _ = browser_tx.send(ServerMessage::SessionResumed {
                mud_connected: s.upstream_live(),
                variables: s.vars.snapshot(),
            });
            let gen = s.attach_browser(browser_tx);
            drop(s);
            tracing::info!(token_tail = %token_tail(&token), "browser resumed session");
            return AuthOutcome { session: handle, gen, created: false };
        }

        let mut session = Session::new(
            token.clone(),
            user_id.clone(),
            character_id.clone(),
            character_name.unwrap_or_default(),
            is_wizard,
            self.store.clone(),
            Arc::clone(&self.events),
        );
        let _ = browser_tx.send(ServerMessage::SessionNew {
            bridge_mode: self.config.bridge_mode().then_some(true),
        });
        let gen = session.attach_browser(browser_tx);
        let handle = SessionHandle::new(session);
        sessions.insert(token.clone(), Arc::clone(&handle));
        by_character.insert(key, token);
        drop(sessions);
        drop(by_character);

        self.events.push("session_new", format!("{user_id}/{character_id}"));
        AuthOutcome { session: handle, gen, created: true }
    }

    /// Full close: teardown plus deregistration. Safe to call repeatedly.
    pub async fn close_session(&self, handle: &Arc<SessionHandle>) {
        let (token, key, bridge_token, already) = {
            let mut s = handle.inner.lock().await;
            let already = s.flags.closed;
            let token = s.token.clone();
            let key = (s.user_id.clone(), s.character_id.clone());
            let bridge_token = s.bridge_token.clone();
            s.teardown();
            (token, key, bridge_token, already)
        };
        handle.cancel.cancel();
        if already {
            return;
        }

        self.sessions.write().await.remove(&token);
        let mut by_character = self.by_character.write().await;
        if by_character.get(&key).is_some_and(|t| *t == token) {
            by_character.remove(&key);
        }
        drop(by_character);
        if let Some(bt) = bridge_token {
            self.bridge_routes.write().await.remove(&bt);
        }

        let store = self.store.clone();
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            if let Err(e) = store.remove_session(&token).await {
                events.push("store_error", format!("remove_session failed: {e}"));
            }
        });
        self.events.push("session_close", format!("{}/{}", key.0, key.1));
        tracing::info!(user_id = %key.0, character_id = %key.1, "session closed");
    }

    /// Suppress boot-time auto-login for a character after an explicit
    /// disconnect.
    pub fn suppress_autologin_for(&self, user_id: &str, character_id: &str) {
        self.suppress_autologin.lock().insert(
            (user_id.to_owned(), character_id.to_owned()),
            Instant::now() + SUPPRESS_AUTOLOGIN_FOR,
        );
    }

    pub fn autologin_suppressed(&self, user_id: &str, character_id: &str) -> bool {
        let mut map = self.suppress_autologin.lock();
        map.retain(|_, deadline| *deadline > Instant::now());
        map.contains_key(&(user_id.to_owned(), character_id.to_owned()))
    }

    /// Fan a system broadcast to every attached browser.
    pub async fn broadcast(&self, message: &str) -> usize {
        let sessions: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().map(Arc::clone).collect();
        let timestamp = epoch_ms();
        let mut reached = 0;
        for handle in sessions {
            let mut s = handle.inner.lock().await;
            if s.browser_attached() {
                reached += 1;
            }
            s.emit(ServerMessage::Broadcast { message: message.to_owned(), timestamp });
        }
        reached
    }
}

/// Periodically close sessions whose browser has been gone too long.
/// Wizards are exempt.
pub fn spawn_idle_sweeper(manager: Arc<Manager>) {
    tokio::spawn(async move {
        let idle_timeout = manager.config.idle_timeout();
        loop {
            tokio::select! {
                _ = manager.shutdown.cancelled() => break,
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            }
            let sessions: Vec<Arc<SessionHandle>> =
                manager.sessions.read().await.values().map(Arc::clone).collect();
            for handle in sessions {
                let expired = {
                    let s = handle.inner.lock().await;
                    !s.is_wizard
                        && s.disconnect_at.is_some_and(|t| t.elapsed() > idle_timeout)
                };
                if expired {
                    tracing::info!("closing idle session");
                    manager.events.push("session_idle", "idle timeout");
                    manager.close_session(&handle).await;
                }
            }
        }
    });
}

/// Last few characters of a token for log lines. Tokens are opaque client
/// input, so the cut must land on a char boundary.
fn token_tail(token: &str) -> &str {
    token.char_indices().rev().nth(5).map_or(token, |(i, _)| &token[i..])
}

/// Current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
