// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory structured event ring for the admin `/logs` endpoint.
//!
//! Bounded at 500 entries with head-drop. Entries flushed to the store are
//! marked persisted so the periodic flush never re-sends them; `/logs` can
//! merge the in-memory ring with a fetched persisted set, de-duplicated by
//! `(time, type)`.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const RING_CAP: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub time: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
    #[serde(default)]
    pub persisted: bool,
}

#[derive(Debug, Default)]
pub struct LogBuffer {
    ring: Mutex<VecDeque<LogEvent>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event_type: impl Into<String>, message: impl Into<String>) {
        let event = LogEvent {
            time: crate::state::epoch_ms(),
            event_type: event_type.into(),
            message: message.into(),
            persisted: false,
        };
        let mut ring = self.ring.lock();
        if ring.len() >= RING_CAP {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    /// Events matching an optional type prefix, newest last.
    pub fn recent(&self, type_prefix: Option<&str>) -> Vec<LogEvent> {
        let ring = self.ring.lock();
        ring.iter()
            .filter(|e| type_prefix.is_none_or(|p| e.event_type.starts_with(p)))
            .cloned()
            .collect()
    }

    /// Unpersisted events; marks them persisted. Used by the store flush.
    pub fn take_unpersisted(&self) -> Vec<LogEvent> {
        let mut ring = self.ring.lock();
        let mut out = Vec::new();
        for e in ring.iter_mut().filter(|e| !e.persisted) {
            e.persisted = true;
            out.push(e.clone());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }
}

/// Merge in-memory and persisted event sets, de-duplicated by `(time, type)`,
/// ordered by time.
pub fn merge_events(memory: Vec<LogEvent>, persisted: Vec<LogEvent>) -> Vec<LogEvent> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<LogEvent> = Vec::with_capacity(memory.len() + persisted.len());
    for e in persisted.into_iter().chain(memory) {
        if seen.insert((e.time, e.event_type.clone())) {
            out.push(e);
        }
    }
    out.sort_by_key(|e| e.time);
    out
}

#[cfg(test)]
#[path = "logbuf_tests.rs"]
mod tests;
