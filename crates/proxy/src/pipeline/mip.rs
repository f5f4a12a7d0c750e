// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-band sideband protocol ("MIP") demultiplexing.
//!
//! The game embeds structured status frames in the text stream. A frame is
//! introduced by a marker `%<id><len><TYPE>` where `<id>` is the 5-digit
//! correlation id negotiated for the session, `<len>` is a 3-digit decimal
//! payload length, and `<TYPE>` is a 3-letter frame type. `<len>` bytes after
//! the marker are the payload; text on either side re-enters the normal line
//! pipeline. Early in a session frames can also arrive `#K%`-prefixed with an
//! id we have not registered yet; those are recognized and stripped too.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sideband state for one session.
#[derive(Debug, Default)]
pub struct MipState {
    pub enabled: bool,
    pub mip_id: String,
    pub debug: bool,
    pub stats: MipStats,
    marker: Option<Regex>,
}

/// Parsed status snapshot, replayed to the browser on reattach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MipStats {
    pub hp: Option<i64>,
    pub hp_max: Option<i64>,
    pub sp: Option<i64>,
    pub sp_max: Option<i64>,
    pub gauge1: Option<i64>,
    pub gauge1_max: Option<i64>,
    pub gauge2: Option<i64>,
    pub gauge2_max: Option<i64>,
    pub gauge_labels: [Option<String>; 4],
    pub enemy: Option<String>,
    pub enemy_pct: Option<i64>,
    pub round: Option<i64>,
    pub room: Option<String>,
    pub exits: Option<String>,
    pub guild_line1: Option<String>,
    pub guild_line2: Option<String>,
    pub guild_vars: BTreeMap<String, i64>,
    pub uptime_days: Option<f64>,
    pub reboot_days: Option<f64>,
}

/// What a demultiplexed frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MipEvent {
    /// The stats snapshot changed; the caller emits `mip_stats`.
    StatsChanged,
    /// A chat line (tell or channel); chat-kind, goes to the chat ring.
    Chat { message: String, chat_type: String, channel: String, raw_text: String },
    /// Unrecognized frame type; surfaced via `mip_debug` when debugging.
    Unknown { msg_type: String, msg_data: String },
}

/// A frame cut out of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipFrame {
    pub frame_type: String,
    pub payload: String,
}

impl MipState {
    pub fn configure(&mut self, enabled: bool, mip_id: String, debug: bool) {
        self.enabled = enabled;
        self.debug = debug;
        self.marker = build_marker(&mip_id);
        self.mip_id = mip_id;
    }

    /// Cut all sideband frames out of a line. Returns the remaining plain
    /// text plus the extracted frames, in order.
    pub fn extract(&self, line: &str) -> (String, Vec<MipFrame>) {
        if !self.enabled {
            return (line.to_owned(), Vec::new());
        }
        let Some(ref marker) = self.marker else {
            return (line.to_owned(), Vec::new());
        };

        let mut rest = line;
        let mut text = String::new();
        let mut frames = Vec::new();

        while let Some(caps) = marker.captures(rest) {
            let (Some(full), Some(len), Some(ty)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                break;
            };
            text.push_str(&rest[..full.start()]);
            let len: usize = len.as_str().parse().unwrap_or(0);
            let after = &rest[full.end()..];
            // Payload is exactly `len` bytes; anything beyond is new input.
            let take = floor_char_boundary(after, len.min(after.len()));
            frames.push(MipFrame {
                frame_type: ty.as_str().to_owned(),
                payload: after[..take].to_owned(),
            });
            rest = &after[take..];
        }
        text.push_str(rest);
        (text, frames)
    }

    /// Apply a frame to the stats snapshot and report what happened.
    pub fn apply(&mut self, frame: &MipFrame) -> MipEvent {
        let payload = frame.payload.as_str();
        match frame.frame_type.as_str() {
            "FFF" => {
                self.apply_status(payload);
                MipEvent::StatsChanged
            }
            "BAD" => {
                self.stats.room = Some(payload.to_owned());
                MipEvent::StatsChanged
            }
            "DDD" => {
                self.stats.exits = Some(payload.replace('~', ","));
                MipEvent::StatsChanged
            }
            "BBA" | "BBB" | "BBC" | "BBD" => {
                let idx = (frame.frame_type.as_bytes()[2] - b'A') as usize;
                self.stats.gauge_labels[idx] = Some(payload.to_owned());
                MipEvent::StatsChanged
            }
            "BAB" => {
                // Tell-style chat. Two layouts, told apart by the first
                // tilde field being empty or the literal "x".
                let (head, body) = payload.split_once('~').unwrap_or(("", payload));
                let message = if head.is_empty() || head == "x" { body } else { payload };
                MipEvent::Chat {
                    message: colorize(message),
                    chat_type: "tell".to_owned(),
                    channel: "tell".to_owned(),
                    raw_text: payload.to_owned(),
                }
            }
            "CAA" => {
                let (channel, body) = payload.split_once('~').unwrap_or((payload, ""));
                MipEvent::Chat {
                    message: colorize(body),
                    chat_type: "channel".to_owned(),
                    channel: channel.to_owned(),
                    raw_text: payload.to_owned(),
                }
            }
            "AAC" => {
                self.stats.reboot_days = payload.trim().parse().ok();
                MipEvent::StatsChanged
            }
            "AAF" => {
                self.stats.uptime_days = payload.trim().parse().ok();
                MipEvent::StatsChanged
            }
            other => MipEvent::Unknown {
                msg_type: other.to_owned(),
                msg_data: payload.to_owned(),
            },
        }
    }

    /// `FFF` status update: tilde-delimited fields, single-letter tag then
    /// value.
    fn apply_status(&mut self, payload: &str) {
        // Guild vars are rebuilt whenever a guild line is present so stale
        // values from the previous update do not linger.
        if payload.split('~').any(|f| f.starts_with('I') || f.starts_with('J')) {
            self.stats.guild_vars.clear();
        }
        for field in payload.split('~') {
            let mut chars = field.chars();
            let Some(tag) = chars.next() else { continue };
            let value = chars.as_str().trim();
            match tag {
                'A' => self.stats.hp = value.parse().ok(),
                'B' => self.stats.hp_max = value.parse().ok(),
                'C' => self.stats.sp = value.parse().ok(),
                'D' => self.stats.sp_max = value.parse().ok(),
                'E' => self.stats.gauge1 = value.parse().ok(),
                'F' => self.stats.gauge1_max = value.parse().ok(),
                'G' => self.stats.gauge2 = value.parse().ok(),
                'H' => self.stats.gauge2_max = value.parse().ok(),
                'K' => self.stats.enemy = Some(value.to_owned()),
                'L' => self.stats.enemy_pct = value.parse().ok(),
                'N' => self.stats.round = value.parse().ok(),
                'I' => {
                    self.stats.guild_line1 = Some(field[1..].to_owned());
                    parse_guild_line(&field[1..], &mut self.stats.guild_vars);
                }
                'J' => {
                    self.stats.guild_line2 = Some(field[1..].to_owned());
                    parse_guild_line(&field[1..], &mut self.stats.guild_vars);
                }
                _ => {}
            }
        }
    }
}

/// Build the marker regex for a registered 5-digit id. The `#K%` form with
/// any id is always accepted; it shows up before registration completes.
fn build_marker(mip_id: &str) -> Option<Regex> {
    if mip_id.len() != 5 || !mip_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Regex::new(&format!(r"(?:#K%(?:{mip_id}|\d{{5}})|%{mip_id})(\d{{3}})([A-Z]{{3}})")).ok()
}

/// Generate a fresh 5-digit session correlation id.
pub fn generate_mip_id() -> String {
    format!("{:05}", rand::random_range(10000..100000u32))
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Guild-line variables: `name: [n/m]`, `name: [n%]`, `name: n%`, `name: [n]`.
fn parse_guild_line(line: &str, vars: &mut BTreeMap<String, i64>) {
    #[allow(clippy::unwrap_used)] // fixed patterns
    static PATTERNS: std::sync::LazyLock<[Regex; 4]> = std::sync::LazyLock::new(|| {
        [
            Regex::new(r"([A-Za-z ]+):\s*\[(-?\d+)/(-?\d+)\]").unwrap(),
            Regex::new(r"([A-Za-z ]+):\s*\[(-?\d+)%\]").unwrap(),
            Regex::new(r"([A-Za-z ]+):\s*(-?\d+)%").unwrap(),
            Regex::new(r"([A-Za-z ]+):\s*\[(-?\d+)\]").unwrap(),
        ]
    });

    let clean = crate::pattern::strip_ansi(line);
    for (i, re) in PATTERNS.iter().enumerate() {
        for caps in re.captures_iter(&clean) {
            let Some(name) = caps.get(1) else { continue };
            let key = name.as_str().trim().to_lowercase().replace(' ', "_");
            if key.is_empty() || vars.contains_key(&key) {
                continue;
            }
            if let Some(value) = caps.get(2).and_then(|m| m.as_str().parse().ok()) {
                vars.insert(key.clone(), value);
            }
            if i == 0 {
                if let Some(max) = caps.get(3).and_then(|m| m.as_str().parse().ok()) {
                    vars.insert(format!("{key}_max"), max);
                }
            }
        }
    }
}

/// Chat color markup (`<r`, `<g`, ...) to span-based inline styles. A color
/// token switches the current span; `>` closes it.
fn colorize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut open = false;
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '<' && i + 1 < chars.len() {
            if let Some(color) = markup_color(chars[i + 1]) {
                if open {
                    out.push_str("</span>");
                }
                out.push_str(&format!("<span style=\"color:{color}\">"));
                open = true;
                i += 2;
                continue;
            }
        }
        if c == '>' && open {
            out.push_str("</span>");
            open = false;
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    if open {
        out.push_str("</span>");
    }
    out
}

fn markup_color(c: char) -> Option<&'static str> {
    match c {
        'r' => Some("#e06c75"),
        'g' => Some("#98c379"),
        'y' => Some("#e5c07b"),
        'b' => Some("#61afef"),
        'm' => Some("#c678dd"),
        'c' => Some("#56b6c2"),
        'w' => Some("#ffffff"),
        'o' => Some("#d19a66"),
        _ => None,
    }
}

#[cfg(test)]
#[path = "mip_tests.rs"]
mod tests;
