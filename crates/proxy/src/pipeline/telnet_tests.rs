// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn plain_text_passes_through() {
    let scan = strip(b"hello world\r\n");
    assert_eq!(scan.clean, b"hello world\r\n");
    assert!(!scan.had_ga);
}

#[test]
fn iac_iac_unescapes_to_literal_255() {
    let scan = strip(&[b'a', IAC, IAC, b'b']);
    assert_eq!(scan.clean, vec![b'a', 255, b'b']);
}

#[test]
fn ga_sets_flag_and_is_dropped() {
    let scan = strip(&[b'P', b'w', b':', IAC, GA]);
    assert_eq!(scan.clean, b"Pw:");
    assert!(scan.had_ga);
}

#[test]
fn negotiation_is_three_bytes() {
    let scan = strip(&[b'a', IAC, WILL, 1, b'b', IAC, DONT, 42, b'c']);
    assert_eq!(scan.clean, b"abc");
}

#[test]
fn subnegotiation_skipped_to_iac_se() {
    let mut chunk = vec![b'x'];
    chunk.extend_from_slice(&[IAC, SB, 24, 1, 2, 3, IAC, SE]);
    chunk.push(b'y');
    let scan = strip(&chunk);
    assert_eq!(scan.clean, b"xy");
}

#[test]
fn unterminated_subnegotiation_swallows_rest() {
    let scan = strip(&[b'x', IAC, SB, 24, 1, 2]);
    assert_eq!(scan.clean, b"x");
}

#[test]
fn unknown_two_byte_command_skipped() {
    let scan = strip(&[b'a', IAC, 241, b'b']);
    assert_eq!(scan.clean, b"ab");
}

#[test]
fn trailing_lone_iac_dropped() {
    let scan = strip(&[b'a', IAC]);
    assert_eq!(scan.clean, b"a");
}
