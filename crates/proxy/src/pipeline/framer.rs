// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line framing with GA flush and the packet-patch timer.
//!
//! The game terminates most output with `\n`, prompts with a telnet GA, and
//! occasionally neither. Chunks are accumulated until one of three things
//! completes a line: a newline, a GA, or the 500 ms packet-patch timer firing
//! with no further data. The timer itself lives with the session task; this
//! module only reports whether a partial is pending.
//!
//! Color state is carried across lines: when a line ends with an open SGR
//! attribute, the next line is prefixed with it so per-line rendering in the
//! browser stays correct.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// How long a trailing partial may sit before being flushed as a line.
pub const PATCH_DELAY: Duration = Duration::from_millis(500);

#[allow(clippy::unwrap_used)] // fixed pattern
static SGR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[([0-9;]*)m").unwrap());

#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
    ansi_carry: String,
}

/// Result of feeding one cleaned chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameResult {
    pub lines: Vec<String>,
    /// A trailing partial is buffered; the caller should (re)arm the
    /// packet-patch timer.
    pub partial_pending: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a telnet-stripped chunk. Complete lines come back with ANSI
    /// carryover already applied.
    pub fn push_chunk(&mut self, clean: &[u8], had_ga: bool) -> FrameResult {
        self.partial.extend_from_slice(clean);

        let mut pieces: Vec<Vec<u8>> = Vec::new();
        let mut start = 0;
        for (i, &b) in self.partial.iter().enumerate() {
            if b == b'\n' {
                pieces.push(self.partial[start..i].to_vec());
                start = i + 1;
            }
        }
        let tail: Vec<u8> = self.partial[start..].to_vec();
        self.partial.clear();

        let mut result = FrameResult::default();
        for piece in pieces {
            result.lines.push(self.finish_line(&piece));
        }

        if had_ga {
            // GA flushes the trailing partial as a line of its own, even if
            // empty pieces were already emitted above.
            if !tail.is_empty() {
                result.lines.push(self.finish_line(&tail));
            }
        } else if !tail.is_empty() {
            self.partial = tail;
            result.partial_pending = true;
        }
        result
    }

    /// Flush the buffered partial; called when the packet-patch timer fires.
    pub fn flush_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let piece = std::mem::take(&mut self.partial);
        Some(self.finish_line(&piece))
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Apply `\r` stripping and ANSI carryover to a completed piece.
    fn finish_line(&mut self, piece: &[u8]) -> String {
        let decoded = String::from_utf8_lossy(piece);
        let mut line: String = decoded.chars().filter(|&c| c != '\r').collect();

        if !self.ansi_carry.is_empty() && !starts_with_sgr(&line) {
            line = format!("{}{}", self.ansi_carry, line);
        }

        for caps in SGR.captures_iter(&line) {
            let params = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            if params.is_empty() || params == "0" {
                self.ansi_carry.clear();
            } else if let Some(m) = caps.get(0) {
                self.ansi_carry = m.as_str().to_owned();
            }
        }
        line
    }
}

fn starts_with_sgr(line: &str) -> bool {
    SGR.find(line).is_some_and(|m| m.start() == 0)
}

#[cfg(test)]
#[path = "framer_tests.rs"]
mod tests;
