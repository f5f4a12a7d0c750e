// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger matching and action execution.
//!
//! Enabled triggers run against every framed line in ascending priority
//! order. All matched triggers apply their non-command actions; only the
//! first matched `command` action fires per line. A runaway guard disables
//! any trigger that fires 50 times inside two seconds, which breaks the
//! classic trigger-echoes-its-own-output loop.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::pattern::{is_wildcard_pattern, strip_ansi, Anchor, CompiledPattern};
use crate::protocol::{Trigger, TriggerAction, TriggerMatchType};
use crate::scripting::aliases::substitute_captures;
use crate::scripting::vars::VarTable;

/// Fires inside the window before a trigger is disabled.
pub const LOOP_LIMIT: u32 = 50;
/// The runaway window; it resets when consecutive fires sit further apart.
pub const LOOP_WINDOW: Duration = Duration::from_secs(2);

#[allow(clippy::unwrap_used)] // fixed pattern
static SGR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

#[derive(Debug)]
enum Matcher {
    Substring(String),
    Pattern(CompiledPattern),
    Regex(Regex),
    /// Compile failed; the trigger is skipped but kept in the table.
    Broken,
}

#[derive(Debug)]
struct CompiledTrigger {
    trigger: Trigger,
    matcher: Matcher,
}

#[derive(Debug, Clone, Copy)]
struct LoopState {
    count: u32,
    first_fire: Instant,
    last_fire: Instant,
}

/// Outbound fan-out produced by trigger actions; the session substitutes
/// `$vars` and delivers after the line is fully processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordOut {
    pub webhook_url: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatmonOut {
    pub message: String,
    pub channel: String,
}

/// Everything one line produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineOutcome {
    /// The colored line with substitutions and highlight markup applied.
    pub line: String,
    pub gagged: bool,
    pub highlight: bool,
    pub sound: Option<String>,
    /// At most one command body per line, captures already substituted and
    /// escaped.
    pub command: Option<String>,
    pub discord: Vec<DiscordOut>,
    pub chatmon: Vec<ChatmonOut>,
    /// Triggers the runaway guard disabled while processing this line.
    pub disabled: Vec<String>,
}

#[derive(Debug, Default)]
pub struct TriggerEngine {
    triggers: Vec<CompiledTrigger>,
    loop_tracker: HashMap<String, LoopState>,
}

impl TriggerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the trigger table. Compile failures are logged and the
    /// affected trigger skipped; everything else keeps working.
    pub fn set_triggers(&mut self, triggers: Vec<Trigger>) {
        self.loop_tracker.clear();
        self.triggers = triggers
            .into_iter()
            .map(|trigger| {
                let matcher = compile_matcher(&trigger);
                CompiledTrigger { trigger, matcher }
            })
            .collect();
        self.triggers.sort_by_key(|t| t.trigger.priority);
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().map(|t| &t.trigger)
    }

    /// Run one colored line through the engine.
    pub fn process_line(&mut self, colored: &str, vars: &VarTable) -> LineOutcome {
        let stripped = strip_ansi(colored);
        let mut outcome = LineOutcome { line: colored.to_owned(), ..LineOutcome::default() };
        let mut command_fired = false;
        let now = Instant::now();

        for ct in &mut self.triggers {
            if !ct.trigger.enabled {
                continue;
            }
            let Some((matched_text, captures)) = match_trigger(&ct.matcher, &stripped) else {
                continue;
            };

            if record_fire(&mut self.loop_tracker, &ct.trigger.id, now) {
                ct.trigger.enabled = false;
                outcome.disabled.push(ct.trigger.id.clone());
                continue;
            }

            for action in &ct.trigger.actions {
                match action {
                    TriggerAction::Gag => outcome.gagged = true,
                    TriggerAction::Sound { name } => outcome.sound = Some(name.clone()),
                    TriggerAction::Command { command } => {
                        if !command_fired {
                            command_fired = true;
                            outcome.command =
                                Some(substitute_captures(command, &captures, "", false, true));
                        }
                    }
                    TriggerAction::Substitute { replacement } => {
                        let repl = substitute_captures(replacement, &captures, "", false, true);
                        let repl = vars.substitute(&repl);
                        outcome.line = replace_in_display(&outcome.line, &matched_text, &repl);
                    }
                    TriggerAction::Highlight { fg_color, bg_color, blink, underline } => {
                        let style = highlight_style(
                            fg_color.as_deref(),
                            bg_color.as_deref(),
                            *blink,
                            *underline,
                        );
                        let wrapped = format!("<span style=\"{style}\">{matched_text}</span>");
                        outcome.line = replace_in_display(&outcome.line, &matched_text, &wrapped);
                        outcome.highlight = true;
                    }
                    TriggerAction::Discord { webhook_url, message } => {
                        outcome.discord.push(DiscordOut {
                            webhook_url: webhook_url.clone(),
                            message: substitute_captures(message, &captures, "", false, true),
                        });
                    }
                    TriggerAction::Chatmon { message, channel } => {
                        outcome.chatmon.push(ChatmonOut {
                            message: substitute_captures(message, &captures, "", false, true),
                            channel: channel.clone(),
                        });
                    }
                }
            }
        }
        outcome
    }
}

fn compile_matcher(trigger: &Trigger) -> Matcher {
    let style = trigger.match_type.unwrap_or_else(|| {
        if is_wildcard_pattern(&trigger.pattern) {
            TriggerMatchType::Wildcard
        } else {
            TriggerMatchType::Substring
        }
    });
    match style {
        TriggerMatchType::Substring => Matcher::Substring(trigger.pattern.clone()),
        TriggerMatchType::Wildcard => {
            match CompiledPattern::compile(&trigger.pattern, Anchor::None) {
                Ok(p) => Matcher::Pattern(p),
                Err(e) => {
                    tracing::warn!(trigger_id = %trigger.id, err = %e, "bad trigger pattern");
                    Matcher::Broken
                }
            }
        }
        TriggerMatchType::Regex => match Regex::new(&trigger.pattern) {
            Ok(re) => Matcher::Regex(re),
            Err(e) => {
                tracing::warn!(trigger_id = %trigger.id, err = %e, "bad trigger regex");
                Matcher::Broken
            }
        },
    }
}

/// Match one trigger; returns the matched substring plus `%N` captures.
fn match_trigger(matcher: &Matcher, stripped: &str) -> Option<(String, Vec<String>)> {
    match matcher {
        Matcher::Substring(pattern) => {
            if pattern.is_empty() || !stripped.contains(pattern.as_str()) {
                return None;
            }
            Some((pattern.clone(), vec![pattern.clone()]))
        }
        Matcher::Pattern(compiled) => {
            let m = compiled.match_line(stripped)?;
            Some((m.captures[0].clone(), m.captures))
        }
        Matcher::Regex(re) => {
            let caps = re.captures(stripped)?;
            let full = caps.get(0)?;
            let mut captures = Vec::with_capacity(caps.len());
            for i in 0..caps.len() {
                captures.push(caps.get(i).map(|m| m.as_str().to_owned()).unwrap_or_default());
            }
            Some((full.as_str().to_owned(), captures))
        }
        Matcher::Broken => None,
    }
}

/// Record a fire and report whether the runaway guard tripped.
fn record_fire(tracker: &mut HashMap<String, LoopState>, id: &str, now: Instant) -> bool {
    let entry = tracker
        .entry(id.to_owned())
        .or_insert(LoopState { count: 0, first_fire: now, last_fire: now });
    if now.duration_since(entry.last_fire) > LOOP_WINDOW {
        entry.count = 1;
        entry.first_fire = now;
    } else {
        entry.count += 1;
    }
    entry.last_fire = now;
    entry.count >= LOOP_LIMIT && now.duration_since(entry.first_fire) <= LOOP_WINDOW
}

fn highlight_style(fg: Option<&str>, bg: Option<&str>, blink: bool, underline: bool) -> String {
    let mut style = String::new();
    if let Some(fg) = fg {
        style.push_str(&format!("color:{fg};"));
    }
    if let Some(bg) = bg {
        style.push_str(&format!("background-color:{bg};"));
    }
    match (underline, blink) {
        (true, true) => style.push_str("text-decoration:underline blink;"),
        (true, false) => style.push_str("text-decoration:underline;"),
        (false, true) => style.push_str("text-decoration:blink;"),
        (false, false) => {}
    }
    style
}

/// Replace matched text in the colored display line.
///
/// When the matched text appears verbatim (no SGR interleaved) every
/// occurrence is replaced. Otherwise the match region is located by walking
/// the display and skipping SGR sequences, and that one region is spliced.
fn replace_in_display(display: &str, matched: &str, replacement: &str) -> String {
    if matched.is_empty() {
        return display.to_owned();
    }
    if display.contains(matched) {
        return display.replace(matched, replacement);
    }

    let stripped = strip_ansi(display);
    let Some(s_start) = stripped.find(matched) else {
        return display.to_owned();
    };
    let s_end = s_start + matched.len();

    let Some((d_start, d_end)) = map_offsets(display, s_start, s_end) else {
        return display.to_owned();
    };
    format!("{}{replacement}{}", &display[..d_start], &display[d_end..])
}

/// Map byte offsets in the stripped line back to the display line.
fn map_offsets(display: &str, s_start: usize, s_end: usize) -> Option<(usize, usize)> {
    let mut segments: Vec<(usize, usize)> = Vec::new();
    let mut prev = 0;
    for m in SGR.find_iter(display) {
        if m.start() > prev {
            segments.push((prev, m.start()));
        }
        prev = m.end();
    }
    if prev < display.len() {
        segments.push((prev, display.len()));
    }

    let mut s_pos = 0;
    let mut d_start = None;
    let mut d_end = None;
    for (seg_start, seg_end) in segments {
        let seg_len = seg_end - seg_start;
        if d_start.is_none() && s_start < s_pos + seg_len {
            d_start = Some(seg_start + (s_start - s_pos));
        }
        if d_end.is_none() && s_end <= s_pos + seg_len {
            d_end = Some(seg_start + (s_end - s_pos));
        }
        s_pos += seg_len;
        if d_start.is_some() && d_end.is_some() {
            break;
        }
    }
    match (d_start, d_end) {
        (Some(s), Some(e)) => Some((s, e)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "triggers_tests.rs"]
mod tests;
