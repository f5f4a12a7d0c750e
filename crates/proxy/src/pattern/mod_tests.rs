// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn compile(pattern: &str) -> CompiledPattern {
    match CompiledPattern::compile(pattern, Anchor::None) {
        Ok(p) => p,
        Err(e) => panic!("compile {pattern:?}: {e}"),
    }
}

fn compile_alias(pattern: &str) -> CompiledPattern {
    match CompiledPattern::compile(pattern, Anchor::Start) {
        Ok(p) => p,
        Err(e) => panic!("compile {pattern:?}: {e}"),
    }
}

#[test]
fn literal_text_is_escaped() {
    let p = compile("2+2 (gold)");
    assert!(p.match_line("you have 2+2 (gold) here").is_some());
    assert!(p.match_line("you have 222 gold here").is_none());
}

#[test]
fn wildcard_lazy_before_text_greedy_at_end() {
    let p = compile("%s costs %d gold");
    let m = p.match_line("you: buy sword costs 15 gold").map(|m| m.captures);
    assert_eq!(
        m,
        Some(vec![
            "you: buy sword costs 15 gold".to_owned(),
            "you: buy sword".to_owned(),
            "15".to_owned(),
        ])
    );

    let p = compile("prompt %s");
    let m = p.match_line("prompt buy sword and shield").map(|m| m.captures);
    assert_eq!(
        m,
        Some(vec![
            "prompt buy sword and shield".to_owned(),
            "buy sword and shield".to_owned(),
        ])
    );
}

#[test]
fn digit_and_word_classes() {
    let p = compile("%w has %d hp");
    let m = p.match_line("Bob has 120 hp").map(|m| m.captures);
    assert_eq!(m, Some(vec!["Bob has 120 hp".to_owned(), "Bob".to_owned(), "120".to_owned()]));
}

#[test]
fn non_capturing_prefix() {
    let p = compile("%!w has %d hp");
    let m = p.match_line("Bob has 120 hp").map(|m| m.captures);
    // %!w consumes without capturing; %d is capture 1.
    assert_eq!(m, Some(vec!["Bob has 120 hp".to_owned(), "120".to_owned()]));
}

#[test]
fn bounded_range() {
    let p = compile("%+2..4d gold");
    assert!(p.match_line("123 gold").is_some());
    assert!(p.match_line("1 gold").is_none());

    let p = compile("id %+3d end");
    assert!(p.match_line("id 12345 end").is_some());
    assert!(p.match_line("id 12 end").is_none());
}

#[test]
fn embedded_regex_group() {
    let p = compile("{[a-z]+} waves");
    let m = p.match_line("bob waves").map(|m| m.captures);
    assert_eq!(m, Some(vec!["bob waves".to_owned(), "bob".to_owned()]));

    let p = compile("%!{[a-z]+} waves %w");
    let m = p.match_line("bob waves cheerfully").map(|m| m.captures);
    assert_eq!(
        m,
        Some(vec!["bob waves cheerfully".to_owned(), "cheerfully".to_owned()])
    );
}

#[test]
fn anchors_pass_through() {
    let p = compile("^You %w$");
    assert!(p.match_line("You smile").is_some());
    assert!(p.match_line("Then You smile").is_none());
    assert!(p.match_line("You smile widely").is_none());
}

#[test]
fn escape_preserves_literal() {
    let p = compile(r"100\% done");
    assert!(p.match_line("100% done").is_some());
}

#[test]
fn case_toggles_consumed() {
    let p = compile("%iYou %w");
    assert!(p.match_line("You wave").is_some());
}

#[test]
fn ansi_run_consumes_sgr_without_capturing() {
    let p = compile("%cHP: %d");
    let m = p.match_line("\x1b[1;31mHP: 42").map(|m| m.captures);
    assert_eq!(m, Some(vec!["\x1b[1;31mHP: 42".to_owned(), "42".to_owned()]));
}

#[test]
fn numbered_wildcards_are_any_runs() {
    let p = compile("%1 tells you: %2");
    let m = p.match_line("Bob tells you: hello there").map(|m| m.captures);
    assert_eq!(
        m,
        Some(vec![
            "Bob tells you: hello there".to_owned(),
            "Bob".to_owned(),
            "hello there".to_owned(),
        ])
    );
}

#[test]
fn alias_mode_appends_trailing_words() {
    let p = compile_alias("cast %w");
    let m = p.match_with_args("cast heal bob now").map(|m| m.captures);
    assert_eq!(
        m,
        Some(vec![
            "cast heal".to_owned(),
            "heal".to_owned(),
            "bob".to_owned(),
            "now".to_owned(),
        ])
    );
}

#[test]
fn alias_mode_is_start_anchored() {
    let p = compile_alias("kill %w");
    assert!(p.match_with_args("say kill rat").is_none());
}

#[test]
fn wildcard_detection() {
    assert!(is_wildcard_pattern("%s costs %d"));
    assert!(is_wildcard_pattern("^starts"));
    assert!(is_wildcard_pattern("ends$"));
    assert!(is_wildcard_pattern("{[0-9]+}"));
    assert!(!is_wildcard_pattern("plain substring"));
    assert!(!is_wildcard_pattern(r"escaped \% and \{ braces"));
}

#[test]
fn strip_ansi_removes_sgr_only() {
    assert_eq!(strip_ansi("\x1b[1;32mhello\x1b[0m world"), "hello world");
    assert_eq!(strip_ansi("no color"), "no color");
}
