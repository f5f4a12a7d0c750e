// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline `#` directives.
//!
//! A handful of directives mutate session variables server-side, in sequence
//! with the surrounding commands, so `#var x 1;say $x` sends `say 1` even
//! when the browser is closed. Each one also goes to the browser as a
//! `client_command` so its mirror of the variables keeps up. Every other `#`
//! command is the browser's business and is forwarded untouched.

use crate::pattern::math;
use crate::scripting::aliases::{split_args, split_commands, Effect, Expander, MAX_REPEAT};
use crate::scripting::format::format_args;

/// Execute one `#` command (`cmd` starts with `#`).
pub fn run(exp: &mut Expander, cmd: &str, depth: usize) {
    let rest = &cmd[1..];
    let (word, remainder) = match rest.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (rest, ""),
    };

    // `#N <cmd>` repeat shorthand.
    if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
        let count: usize = word.parse().unwrap_or(0);
        for _ in 0..count.min(MAX_REPEAT) {
            for part in split_commands(remainder) {
                exp.expand(&part, depth + 1);
            }
        }
        return;
    }

    match word.to_ascii_lowercase().as_str() {
        "math" => {
            if let Some((name, expr)) = remainder.split_once(char::is_whitespace) {
                let expr = exp.vars.substitute(expr.trim());
                match math::eval(&expr) {
                    Ok(value) => exp.vars.set_server(name, value.to_string()),
                    // A bad expression is a silent no-op.
                    Err(e) => tracing::debug!(expr = %expr, err = %e, "#math rejected"),
                }
            }
            exp.effects.push(Effect::Client(cmd.to_owned()));
        }
        "var" | "variable" => {
            if let Some((name, value)) = split_name_value(remainder) {
                let value = exp.vars.substitute(&value);
                exp.vars.set_server(name, value);
            }
            exp.effects.push(Effect::Client(cmd.to_owned()));
        }
        "unvar" => {
            if !remainder.is_empty() {
                let name = remainder.split_whitespace().next().unwrap_or(remainder);
                exp.vars.unset_server(name);
            }
            exp.effects.push(Effect::Client(cmd.to_owned()));
        }
        "format" => {
            if let Some((name, rest)) = remainder.split_once(char::is_whitespace) {
                let mut parts = split_args(rest.trim());
                if !parts.is_empty() {
                    let fmt = exp.vars.substitute(&parts.remove(0));
                    let args: Vec<String> =
                        parts.iter().map(|a| exp.vars.substitute(a)).collect();
                    let value = format_args(&fmt, &args);
                    exp.vars.set_server(name, value);
                }
            }
            exp.effects.push(Effect::Client(cmd.to_owned()));
        }
        "cat" => {
            if let Some((name, rest)) = remainder.split_once(char::is_whitespace) {
                let addition = split_args(rest.trim())
                    .iter()
                    .map(|a| exp.vars.substitute(a))
                    .collect::<Vec<_>>()
                    .join(" ");
                let mut value = exp.vars.get(name).unwrap_or("").to_owned();
                value.push_str(&addition);
                exp.vars.set_server(name, value);
            }
            exp.effects.push(Effect::Client(cmd.to_owned()));
        }
        "replace" => {
            if let Some((name, rest)) = remainder.split_once(char::is_whitespace) {
                let parts = split_args(rest.trim());
                if parts.len() >= 2 {
                    let old = exp.vars.substitute(&parts[0]);
                    let new = exp.vars.substitute(&parts[1]);
                    if let Some(current) = exp.vars.get(name) {
                        let updated = current.replace(&old, &new);
                        exp.vars.set_server(name, updated);
                    }
                }
            }
            exp.effects.push(Effect::Client(cmd.to_owned()));
        }
        // Everything else (#showme, #delay, #loop, #if, #read, #ticker, ...)
        // runs in the browser.
        _ => exp.effects.push(Effect::Client(cmd.to_owned())),
    }
}

/// Split `name value...`, unwrapping a fully-braced value.
fn split_name_value(remainder: &str) -> Option<(String, String)> {
    let (name, value) = remainder.split_once(char::is_whitespace)?;
    let value = value.trim();
    let value = strip_outer_braces(value);
    Some((name.to_owned(), value.to_owned()))
}

fn strip_outer_braces(value: &str) -> &str {
    let Some(inner) = value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) else {
        return value;
    };
    // Only strip when the braces actually close each other.
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return value;
                }
            }
            _ => {}
        }
    }
    if depth == 0 {
        inner
    } else {
        value
    }
}

#[cfg(test)]
#[path = "directives_tests.rs"]
mod tests;
