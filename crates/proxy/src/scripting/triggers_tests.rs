// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{Trigger, TriggerAction};

fn trigger(id: &str, priority: i32, pattern: &str, actions: Vec<TriggerAction>) -> Trigger {
    Trigger {
        id: id.to_owned(),
        name: String::new(),
        pattern: pattern.to_owned(),
        match_type: None,
        enabled: true,
        priority,
        actions,
    }
}

fn engine(triggers: Vec<Trigger>) -> TriggerEngine {
    let mut e = TriggerEngine::new();
    e.set_triggers(triggers);
    e
}

#[test]
fn literal_substring_match() {
    let mut e = engine(vec![trigger("t1", 5, "secret", vec![TriggerAction::Gag])]);
    let vars = VarTable::new();
    assert!(e.process_line("the secret door", &vars).gagged);
    assert!(!e.process_line("nothing here", &vars).gagged);
    // Literal matching is case-sensitive.
    assert!(!e.process_line("the SECRET door", &vars).gagged);
}

#[test]
fn wildcard_pattern_captures_into_command() {
    let mut e = engine(vec![trigger(
        "t1",
        5,
        "%w tells you: %*",
        vec![TriggerAction::Command { command: "say You said: %2".to_owned() }],
    )]);
    let vars = VarTable::new();
    let outcome = e.process_line("Bob tells you: ha; quit", &vars);
    // Captured text is escaped so the semicolon cannot split the command.
    assert_eq!(outcome.command.as_deref(), Some("say You said: ha\\; quit"));
}

#[test]
fn matching_runs_against_stripped_line() {
    let mut e = engine(vec![trigger("t1", 5, "secret", vec![TriggerAction::Gag])]);
    let vars = VarTable::new();
    let outcome = e.process_line("\x1b[31msec\x1b[0mret door", &vars);
    assert!(outcome.gagged);
    // The colored original is preserved on the outcome.
    assert_eq!(outcome.line, "\x1b[31msec\x1b[0mret door");
}

#[test]
fn first_command_wins_by_priority() {
    let mut e = engine(vec![
        trigger("late", 9, "hit", vec![TriggerAction::Command { command: "say late".to_owned() }]),
        trigger("early", 1, "hit", vec![TriggerAction::Command { command: "say early".to_owned() }]),
    ]);
    let vars = VarTable::new();
    let outcome = e.process_line("hit", &vars);
    assert_eq!(outcome.command.as_deref(), Some("say early"));
}

#[test]
fn gag_does_not_block_later_command() {
    // A gag at priority 3 plus a command at 5: the line is suppressed but
    // the command still fires.
    let mut e = engine(vec![
        trigger("gagger", 3, "secret", vec![TriggerAction::Gag]),
        trigger(
            "cmd",
            5,
            "secret",
            vec![TriggerAction::Command { command: "say found".to_owned() }],
        ),
    ]);
    let vars = VarTable::new();
    let outcome = e.process_line("secret", &vars);
    assert!(outcome.gagged);
    assert_eq!(outcome.command.as_deref(), Some("say found"));
}

#[test]
fn substitute_rewrites_display() {
    let mut e = engine(vec![trigger(
        "t1",
        5,
        "gold",
        vec![TriggerAction::Substitute { replacement: "GOLD".to_owned() }],
    )]);
    let vars = VarTable::new();
    let outcome = e.process_line("a pile of gold and more gold", &vars);
    assert_eq!(outcome.line, "a pile of GOLD and more GOLD");
}

#[test]
fn substitute_expands_captures_and_vars() {
    let mut e = engine(vec![trigger(
        "t1",
        5,
        "%d coins",
        vec![TriggerAction::Substitute { replacement: "%1 shiny $metal coins".to_owned() }],
    )]);
    let mut vars = VarTable::new();
    vars.set_server("metal", "copper");
    let outcome = e.process_line("you see 42 coins", &vars);
    assert_eq!(outcome.line, "you see 42 shiny copper coins");
}

#[test]
fn highlight_wraps_match_in_span() {
    let mut e = engine(vec![trigger(
        "t1",
        5,
        "Bob",
        vec![TriggerAction::Highlight {
            fg_color: Some("#ff0000".to_owned()),
            bg_color: None,
            blink: false,
            underline: true,
        }],
    )]);
    let vars = VarTable::new();
    let outcome = e.process_line("Bob waves", &vars);
    assert!(outcome.highlight);
    assert_eq!(
        outcome.line,
        "<span style=\"color:#ff0000;text-decoration:underline;\">Bob</span> waves"
    );
}

#[test]
fn highlight_splices_through_interleaved_sgr() {
    let mut e = engine(vec![trigger(
        "t1",
        5,
        "redword",
        vec![TriggerAction::Highlight {
            fg_color: Some("#fff".to_owned()),
            bg_color: None,
            blink: false,
            underline: false,
        }],
    )]);
    let vars = VarTable::new();
    let outcome = e.process_line("say \x1b[31mred\x1b[1mword\x1b[0m now", &vars);
    assert!(outcome.line.contains("<span style=\"color:#fff;\">redword</span>"));
}

#[test]
fn sound_and_gag_from_different_triggers() {
    let mut e = engine(vec![
        trigger("s", 1, "ding", vec![TriggerAction::Sound { name: "bell".to_owned() }]),
        trigger("g", 2, "ding", vec![TriggerAction::Gag]),
    ]);
    let vars = VarTable::new();
    let outcome = e.process_line("ding dong", &vars);
    assert_eq!(outcome.sound.as_deref(), Some("bell"));
    assert!(outcome.gagged);
}

#[test]
fn discord_and_chatmon_queue() {
    let mut e = engine(vec![trigger(
        "t1",
        5,
        "%w tells you: %*",
        vec![
            TriggerAction::Discord {
                webhook_url: "https://discord.com/api/webhooks/x".to_owned(),
                message: "%1: %2".to_owned(),
            },
            TriggerAction::Chatmon { message: "%0".to_owned(), channel: "tells".to_owned() },
        ],
    )]);
    let vars = VarTable::new();
    let outcome = e.process_line("Bob tells you: hi", &vars);
    assert_eq!(
        outcome.discord,
        vec![DiscordOut {
            webhook_url: "https://discord.com/api/webhooks/x".to_owned(),
            message: "Bob: hi".to_owned(),
        }]
    );
    assert_eq!(
        outcome.chatmon,
        vec![ChatmonOut { message: "Bob tells you: hi".to_owned(), channel: "tells".to_owned() }]
    );
}

#[test]
fn disabled_trigger_skipped() {
    let mut t = trigger("t1", 5, "x", vec![TriggerAction::Gag]);
    t.enabled = false;
    let mut e = engine(vec![t]);
    let vars = VarTable::new();
    assert!(!e.process_line("x", &vars).gagged);
}

#[test]
fn broken_regex_skipped_not_fatal() {
    let mut bad = trigger("bad", 1, "([", vec![TriggerAction::Gag]);
    bad.match_type = Some(crate::protocol::TriggerMatchType::Regex);
    let good = trigger("good", 5, "ok", vec![TriggerAction::Gag]);
    let mut e = engine(vec![bad, good]);
    let vars = VarTable::new();
    assert!(e.process_line("ok", &vars).gagged);
}

#[test]
fn runaway_guard_disables_after_50_fast_fires() {
    let mut e = engine(vec![trigger("t1", 5, "spam", vec![TriggerAction::Gag])]);
    let vars = VarTable::new();
    let mut disabled_reports = 0;
    for _ in 0..60 {
        let outcome = e.process_line("spam", &vars);
        disabled_reports += outcome.disabled.len();
    }
    assert_eq!(disabled_reports, 1);
    // Trigger no longer fires.
    assert!(!e.process_line("spam", &vars).gagged);
}

#[test]
fn explicit_substring_match_type_beats_autodetect() {
    let mut t = trigger("t1", 5, "100%", vec![TriggerAction::Gag]);
    t.match_type = Some(crate::protocol::TriggerMatchType::Substring);
    let mut e = engine(vec![t]);
    let vars = VarTable::new();
    assert!(e.process_line("loaded 100% done", &vars).gagged);
}
