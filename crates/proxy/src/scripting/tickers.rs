// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticker scheduling.
//!
//! Every enabled ticker gets its own interval task. The command is handed to
//! the fire callback untouched; variable substitution happens at fire time in
//! the session, not here, so `$hp`-style commands always see fresh values.
//! Updating the ticker table tears down every timer and recreates them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::protocol::Ticker;

/// Floor for ticker intervals.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct TickerTimers {
    handles: Vec<JoinHandle<()>>,
}

impl TickerTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all timers with fresh ones for the given table.
    pub fn restart<F>(&mut self, tickers: &[Ticker], fire: F)
    where
        F: Fn(Ticker) + Clone + Send + Sync + 'static,
    {
        self.clear();
        for ticker in tickers.iter().filter(|t| t.enabled) {
            let interval = if ticker.interval.is_finite() && ticker.interval > 0.0 {
                Duration::from_secs_f64(ticker.interval).max(MIN_INTERVAL)
            } else {
                MIN_INTERVAL
            };
            let ticker = ticker.clone();
            let fire = fire.clone();
            self.handles.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; a ticker fires after
                // its interval, not on creation.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    fire(ticker.clone());
                }
            }));
        }
    }

    /// Abort every timer.
    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub fn active(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TickerTimers {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
#[path = "tickers_tests.rs"]
mod tests;
