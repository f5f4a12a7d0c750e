// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence across proxy restarts.
//!
//! On shutdown every session with a live upstream is serialized to the
//! preferences store. On boot the list is read back and each record is
//! resurrected: in bridge mode by resuming the held socket, in direct mode by
//! reconnecting and driving the auto-login dialog with the stored password.
//! Records older than the staleness window are discarded, and the store is
//! cleared after restore so a crashed restore cannot double-resurrect.

use std::sync::Arc;
use std::time::Duration;

use crate::config::server_by_label;
use crate::protocol::ServerMessage;
use crate::session::{Session, SessionHandle, UpstreamLink};
use crate::state::{epoch_ms, Manager};
use crate::store::PersistRecord;
use crate::upstream;
use crate::upstream::autologin::AutoLogin;

/// Time allowed for upstream FINs to propagate before the process exits.
const FIN_SETTLE: Duration = Duration::from_millis(1500);

/// Log flush cadence.
const LOG_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Serialize every session that still has a live upstream.
pub async fn build_records(manager: &Arc<Manager>) -> Vec<PersistRecord> {
    let handles: Vec<_> = manager.sessions.read().await.values().map(Arc::clone).collect();
    let mut records = Vec::new();
    let now = epoch_ms();
    for handle in handles {
        let s = handle.inner.lock().await;
        if s.upstream.is_none() {
            continue;
        }
        let Some(target) = crate::config::allowed_server(&s.host, s.port) else {
            continue;
        };
        records.push(PersistRecord {
            user_id: s.user_id.clone(),
            character_id: s.character_id.clone(),
            character_name: s.character_name.clone(),
            server: target.label.to_owned(),
            // In bridge mode the bridge knows the socket by this token.
            token: s.bridge_token.clone().unwrap_or_else(|| s.token.clone()),
            is_wizard: s.is_wizard,
            persisted_at: now,
        });
    }
    records
}

/// SIGTERM/SIGINT path: notify, mark, persist, release sockets.
pub async fn shutdown(manager: &Arc<Manager>) {
    tracing::info!("shutdown: persisting sessions");
    let handles: Vec<_> = manager.sessions.read().await.values().map(Arc::clone).collect();
    for handle in &handles {
        let mut s = handle.inner.lock().await;
        s.flags.server_restarting = true;
        s.emit(ServerMessage::system_status(
            "Server restarting; your session will resume shortly.",
        ));
    }

    let records = build_records(manager).await;
    if let Err(e) = manager.store.save_sessions(&records).await {
        manager.events.push("store_error", format!("persist failed: {e}"));
        tracing::warn!(err = %e, "persisting sessions failed");
    } else {
        tracing::info!(count = records.len(), "sessions persisted");
    }

    if !manager.config.bridge_mode() {
        // Direct mode: FIN each upstream so the game recognizes linkdeath.
        for handle in &handles {
            let s = handle.inner.lock().await;
            if let Some(UpstreamLink::Direct { cancel, .. }) = &s.upstream {
                cancel.cancel();
            }
        }
        tokio::time::sleep(FIN_SETTLE).await;
    }
    // In bridge mode the bridge keeps every upstream socket; dropping the
    // control WS at process exit is the whole hand-off.

    let logs = manager.events.take_unpersisted();
    if !logs.is_empty() {
        let _ = manager.store.save_logs(&logs).await;
    }
}

/// Boot-time restore task. Direct mode runs a second pass after the
/// configured delay to mop up sessions whose upstream had not yet closed on
/// the first attempt.
pub fn spawn_restore(manager: Arc<Manager>) {
    tokio::spawn(async move {
        let leftovers = restore_pass(&manager, &fetch_records(&manager).await).await;

        if let Err(e) = manager.store.clear_sessions().await {
            manager.events.push("store_error", format!("clear failed: {e}"));
        }

        if !manager.config.bridge_mode() && !leftovers.is_empty() {
            let delay = Duration::from_secs(manager.config.restore_retry_secs);
            tokio::select! {
                _ = manager.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            restore_pass(&manager, &leftovers).await;
        }
    });
}

async fn fetch_records(manager: &Arc<Manager>) -> Vec<PersistRecord> {
    match manager.store.list_sessions().await {
        Ok(records) => records,
        Err(e) => {
            manager.events.push("store_error", format!("restore list failed: {e}"));
            tracing::warn!(err = %e, "fetching persisted sessions failed");
            Vec::new()
        }
    }
}

/// Attempt to resurrect each record; returns the ones worth retrying.
async fn restore_pass(manager: &Arc<Manager>, records: &[PersistRecord]) -> Vec<PersistRecord> {
    let max_age_ms = manager.config.persist_max_age().as_millis() as u64;
    let now = epoch_ms();
    let mut leftovers = Vec::new();

    for record in records {
        if now.saturating_sub(record.persisted_at) > max_age_ms {
            tracing::info!(character = %record.character_name, "skipping stale record");
            continue;
        }
        let key = (record.user_id.clone(), record.character_id.clone());
        if manager.by_character.read().await.contains_key(&key) {
            // A browser beat us to it.
            continue;
        }
        if manager.autologin_suppressed(&record.user_id, &record.character_id) {
            tracing::info!(character = %record.character_name, "auto-login suppressed");
            continue;
        }
        let Some(target) = server_by_label(&record.server) else {
            continue;
        };

        let mut session = Session::new(
            record.token.clone(),
            record.user_id.clone(),
            record.character_id.clone(),
            record.character_name.clone(),
            record.is_wizard,
            manager.store.clone(),
            Arc::clone(&manager.events),
        );
        session.host = target.host.to_owned();
        session.port = target.port;
        let handle = SessionHandle::new(session);
        manager.sessions.write().await.insert(record.token.clone(), Arc::clone(&handle));
        manager.by_character.write().await.insert(key, record.token.clone());

        let restored = if manager.config.bridge_mode() {
            upstream::resume_bridge_session(manager, &handle, &record.token).await.is_ok()
        } else {
            restore_direct(manager, &handle, record).await
        };

        if restored {
            // Load notification prefs so chat fans out while no browser is
            // attached.
            match manager.store.get_discord_prefs(&record.user_id, &record.character_id).await {
                Ok(prefs) => {
                    let mut s = handle.inner.lock().await;
                    let _ = s.set_discord_prefs(prefs.channel_prefs, prefs.username);
                }
                Err(e) => {
                    tracing::debug!(err = %e, "discord prefs fetch failed");
                }
            }
            manager
                .events
                .push("session_restore", format!("{}/{}", record.user_id, record.character_id));
            tracing::info!(character = %record.character_name, "session restored");
        } else {
            manager.close_session(&handle).await;
            leftovers.push(record.clone());
        }
    }
    leftovers
}

async fn restore_direct(
    manager: &Arc<Manager>,
    handle: &Arc<SessionHandle>,
    record: &PersistRecord,
) -> bool {
    let password = match manager.store.get_password(&record.user_id, &record.character_id).await {
        Ok(password) => password,
        Err(e) => {
            manager.events.push("store_error", format!("password fetch failed: {e}"));
            tracing::warn!(character = %record.character_name, err = %e, "password fetch failed");
            return false;
        }
    };
    let autologin = AutoLogin::new(record.character_name.clone(), password);
    let Some(target) = server_by_label(&record.server) else {
        return false;
    };
    match upstream::connect_session(manager, handle, target.host, target.port, Some(autologin))
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(character = %record.character_name, err = %e, "restore connect failed");
            false
        }
    }
}

/// Periodically flush the structured event ring to the store.
pub fn spawn_log_flusher(manager: Arc<Manager>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = manager.shutdown.cancelled() => break,
                _ = tokio::time::sleep(LOG_FLUSH_INTERVAL) => {}
            }
            let logs = manager.events.take_unpersisted();
            if logs.is_empty() {
                continue;
            }
            if let Err(e) = manager.store.save_logs(&logs).await {
                tracing::warn!(err = %e, count = logs.len(), "log flush failed");
            }
        }
    });
}
