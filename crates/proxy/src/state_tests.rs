// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio::sync::mpsc;

use super::*;
use crate::protocol::ServerMessage;
use crate::session::UpstreamLink;

fn manager() -> Arc<Manager> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = crate::config::ProxyConfig::parse_from(["mudlink"]);
    Arc::new(Manager::new(config, CancellationToken::new()))
}

fn token(c: char) -> String {
    std::iter::repeat_n(c, 64).collect()
}

async fn auth(
    manager: &Arc<Manager>,
    tok: &str,
    user: &str,
    character: &str,
) -> (AuthOutcome, mpsc::UnboundedReceiver<ServerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let outcome = manager
        .authenticate(
            tok.to_owned(),
            user.to_owned(),
            character.to_owned(),
            Some("Ada".to_owned()),
            false,
            tx,
        )
        .await;
    (outcome, rx)
}

#[tokio::test]
async fn new_session_registers_both_maps() {
    let m = manager();
    let (outcome, mut rx) = auth(&m, &token('a'), "u1", "c1").await;
    assert!(outcome.created);
    assert_eq!(m.session_count().await, 1);
    assert!(m
        .by_character
        .read()
        .await
        .contains_key(&("u1".to_owned(), "c1".to_owned())));
    assert!(matches!(rx.try_recv(), Ok(ServerMessage::SessionNew { .. })));
}

#[tokio::test]
async fn same_token_displaces_old_browser() {
    let m = manager();
    let (_, mut old_rx) = auth(&m, &token('a'), "u1", "c1").await;
    while old_rx.try_recv().is_ok() {}

    let (outcome, mut new_rx) = auth(&m, &token('a'), "u1", "c1").await;
    assert!(!outcome.created);
    assert_eq!(m.session_count().await, 1);
    assert!(matches!(old_rx.try_recv(), Ok(ServerMessage::SessionTaken)));
    assert!(matches!(new_rx.try_recv(), Ok(ServerMessage::SessionResumed { .. })));
}

#[tokio::test]
async fn rekey_moves_state_under_new_token() {
    let m = manager();
    let (first, mut old_rx) = auth(&m, &token('a'), "u1", "c1").await;
    while old_rx.try_recv().is_ok() {}

    // Give the session a live upstream stub so mudConnected carries over.
    let (up_tx, _up_rx) = mpsc::unbounded_channel();
    {
        let mut s = first.session.inner.lock().await;
        s.upstream = Some(UpstreamLink::Direct {
            tx: up_tx,
            cancel: CancellationToken::new(),
            peer: None,
        });
        s.upstream_connected = true;
        s.vars.set_server("x", "1");
    }

    let (second, mut new_rx) = auth(&m, &token('b'), "u1", "c1").await;
    assert!(!second.created);
    assert!(Arc::ptr_eq(&first.session, &second.session));
    assert_eq!(m.session_count().await, 1);
    assert!(m.get(&token('a')).await.is_none());
    assert!(m.get(&token('b')).await.is_some());

    // Old browser was told; new browser resumed with state intact.
    assert!(matches!(old_rx.try_recv(), Ok(ServerMessage::SessionTaken)));
    match new_rx.try_recv() {
        Ok(ServerMessage::SessionResumed { mud_connected, variables }) => {
            assert!(mud_connected);
            assert_eq!(variables.get("x").map(String::as_str), Some("1"));
        }
        other => panic!("expected session_resumed, got {other:?}"),
    }
}

#[tokio::test]
async fn single_owner_invariant_across_tokens() {
    let m = manager();
    let _ = auth(&m, &token('a'), "u1", "c1").await;
    let _ = auth(&m, &token('b'), "u1", "c1").await;
    let _ = auth(&m, &token('c'), "u1", "c1").await;
    assert_eq!(m.session_count().await, 1);
    assert_eq!(m.by_character.read().await.len(), 1);
}

#[tokio::test]
async fn distinct_characters_coexist() {
    let m = manager();
    let _ = auth(&m, &token('a'), "u1", "c1").await;
    let _ = auth(&m, &token('b'), "u1", "c2").await;
    let _ = auth(&m, &token('c'), "u2", "c1").await;
    assert_eq!(m.session_count().await, 3);
}

#[tokio::test]
async fn close_session_deregisters_and_is_idempotent() {
    let m = manager();
    let (outcome, _rx) = auth(&m, &token('a'), "u1", "c1").await;
    m.close_session(&outcome.session).await;
    assert_eq!(m.session_count().await, 0);
    assert!(m.by_character.read().await.is_empty());
    // Second close is a no-op.
    m.close_session(&outcome.session).await;
    assert_eq!(m.session_count().await, 0);
}

#[tokio::test]
async fn broadcast_reaches_attached_browsers() {
    let m = manager();
    let (_, mut rx1) = auth(&m, &token('a'), "u1", "c1").await;
    let (_, mut rx2) = auth(&m, &token('b'), "u2", "c2").await;
    while rx1.try_recv().is_ok() {}
    while rx2.try_recv().is_ok() {}

    let reached = m.broadcast("maintenance at noon").await;
    assert_eq!(reached, 2);
    assert!(matches!(rx1.try_recv(), Ok(ServerMessage::Broadcast { .. })));
    assert!(matches!(rx2.try_recv(), Ok(ServerMessage::Broadcast { .. })));
}

#[test]
fn token_tail_is_char_boundary_safe() {
    assert_eq!(token_tail("abcdefgh"), "cdefgh");
    assert_eq!(token_tail("abc"), "abc");
    // A multibyte char straddling the would-be byte cut must not panic.
    let mut tok = "a".repeat(57);
    tok.push_str("é…‰"); // multibyte chars in the tail region
    tok.push_str("xx");
    assert!(token_tail(&tok).ends_with("xx"));
}

#[tokio::test]
async fn autologin_suppression_expires() {
    let m = manager();
    m.suppress_autologin_for("u1", "c1");
    assert!(m.autologin_suppressed("u1", "c1"));
    assert!(!m.autologin_suppressed("u1", "c2"));
}
