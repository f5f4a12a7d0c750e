// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capture-time and output-time escaping.
//!
//! Text captured from the game can contain `;`, `$`, `@`, or `\` — characters
//! that are meaningful to the command splitter and variable substitution.
//! [`escape_capture`] neutralizes them before a capture is substituted into a
//! command body. [`unescape_output`] is the inverse pass applied immediately
//! before bytes are written upstream, and also interprets the usual backslash
//! escapes (`\n`, `\t`, `\xHH`, ...).

use crate::pattern::strip_ansi;

/// Escape a capture before substitution into a command body.
///
/// The value is ANSI-stripped first; a semicolon inside captured game text
/// must not split the command it lands in.
pub fn escape_capture(value: &str) -> String {
    let clean = strip_ansi(value);
    let mut out = String::with_capacity(clean.len());
    for c in clean.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("$$"),
            ';' => out.push_str("\\;"),
            '@' => out.push_str("\\@"),
            _ => out.push(c),
        }
    }
    out
}

/// Interpret backslash escapes on a command immediately before it is written
/// to the upstream socket.
pub fn unescape_output(cmd: &str) -> String {
    let chars: Vec<char> = cmd.chars().collect();
    let mut out = String::with_capacity(cmd.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        match chars[i + 1] {
            ';' => out.push(';'),
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' => out.push('\x1b'),
            '@' => out.push('@'),
            'x' => {
                let hex: String = chars.iter().skip(i + 2).take(2).collect();
                if hex.len() == 2 {
                    if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                        out.push(byte as char);
                        i += 4;
                        continue;
                    }
                }
                // Malformed \xHH passes through untouched.
                out.push('\\');
                out.push('x');
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        i += 2;
    }
    out
}

#[cfg(test)]
#[path = "escape_tests.rs"]
mod tests;
