// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::{Duration, Instant};

use super::*;

#[test]
fn substitute_plain_and_braced() {
    let mut t = VarTable::new();
    t.set_server("x", "1");
    t.set_server("target", "orc");
    assert_eq!(t.substitute("say $x"), "say 1");
    assert_eq!(t.substitute("kill ${target}!"), "kill orc!");
    assert_eq!(t.substitute("${target}$x"), "orc1");
}

#[test]
fn substitute_unknown_left_untouched() {
    let t = VarTable::new();
    assert_eq!(t.substitute("say $missing"), "say $missing");
    assert_eq!(t.substitute("say ${missing}"), "say ${missing}");
}

#[test]
fn dollar_dollar_is_literal() {
    let mut t = VarTable::new();
    t.set_server("x", "1");
    assert_eq!(t.substitute("cost $$x is $x"), "cost $x is 1");
}

#[test]
fn bare_dollar_passes_through() {
    let t = VarTable::new();
    assert_eq!(t.substitute("price: $ 10"), "price: $ 10");
    assert_eq!(t.substitute("end$"), "end$");
}

#[test]
fn bracket_path_uses_literal_key() {
    let mut t = VarTable::new();
    t.set_server("spells[heal]", "cure light wounds");
    assert_eq!(t.substitute("cast $spells[heal]"), "cast cure light wounds");
}

#[test]
fn snapshot_replaces_and_deletes() {
    let mut t = VarTable::new();
    t.set_server("a", "1");
    t.set_server("b", "2");
    // Age the stamps past the window.
    let later = Instant::now() + Duration::from_secs(3);
    t.merge_at([("a".to_owned(), "10".to_owned())].into(), later);
    assert_eq!(t.get("a"), Some("10"));
    assert_eq!(t.get("b"), None);
}

#[test]
fn recent_server_write_wins_over_snapshot() {
    let mut t = VarTable::new();
    t.set_server("x", "2");
    // Browser snapshot from before the server-side #math.
    t.merge_snapshot([("x".to_owned(), "1".to_owned())].into());
    assert_eq!(t.get("x"), Some("2"));
}

#[test]
fn recent_server_write_survives_omission() {
    let mut t = VarTable::new();
    t.set_server("x", "2");
    t.merge_snapshot(HashMap::new());
    assert_eq!(t.get("x"), Some("2"));
}

#[test]
fn stale_server_write_loses() {
    let mut t = VarTable::new();
    t.set_server("x", "2");
    let later = Instant::now() + Duration::from_secs(3);
    t.merge_at([("x".to_owned(), "1".to_owned())].into(), later);
    assert_eq!(t.get("x"), Some("1"));
}

#[test]
fn recent_server_delete_blocks_resurrection() {
    let mut t = VarTable::new();
    t.set_server("x", "2");
    t.unset_server("x");
    t.merge_snapshot([("x".to_owned(), "1".to_owned())].into());
    assert_eq!(t.get("x"), None);
}
