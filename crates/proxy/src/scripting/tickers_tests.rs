// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::sync::mpsc;

use super::*;

fn ticker(id: &str, command: &str, interval: f64, enabled: bool) -> Ticker {
    Ticker { id: id.to_owned(), command: command.to_owned(), interval, enabled }
}

#[tokio::test]
async fn enabled_ticker_fires_repeatedly() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut timers = TickerTimers::new();
    timers.restart(&[ticker("t1", "smile", 0.1, true)], move |t| {
        let _ = tx.send(t.command);
    });

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert_eq!(first.ok().flatten().as_deref(), Some("smile"));
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert_eq!(second.ok().flatten().as_deref(), Some("smile"));
}

#[tokio::test]
async fn disabled_ticker_never_fires() {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut timers = TickerTimers::new();
    timers.restart(&[ticker("t1", "smile", 0.1, false)], move |t| {
        let _ = tx.send(t.command);
    });
    assert_eq!(timers.active(), 0);
    let fired = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(fired.is_err() || fired.ok().flatten().is_none());
}

#[tokio::test]
async fn restart_replaces_timers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx2 = tx.clone();
    let mut timers = TickerTimers::new();
    timers.restart(&[ticker("old", "old", 0.1, true)], move |t| {
        let _ = tx.send(t.command);
    });
    timers.restart(&[ticker("new", "new", 0.1, true)], move |t| {
        let _ = tx2.send(t.command);
    });

    // Only the new ticker's command should ever arrive.
    for _ in 0..3 {
        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(got.ok().flatten().as_deref(), Some("new"));
    }
}

#[tokio::test]
async fn clear_stops_everything() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut timers = TickerTimers::new();
    timers.restart(&[ticker("t1", "x", 0.1, true)], move |t| {
        let _ = tx.send(t.command);
    });
    timers.clear();
    assert_eq!(timers.active(), 0);
    // Drain anything already in flight, then confirm silence.
    tokio::time::sleep(Duration::from_millis(250)).await;
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn tiny_interval_clamped_not_rejected() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut timers = TickerTimers::new();
    timers.restart(&[ticker("t1", "fast", 0.0001, true)], move |t| {
        let _ = tx.send(t.command);
    });
    let got = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
    assert_eq!(got.ok().flatten().as_deref(), Some("fast"));
}
