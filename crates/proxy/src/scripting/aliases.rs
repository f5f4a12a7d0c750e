// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command splitting and alias expansion.
//!
//! Inbound command strings are split on unescaped `;` and newlines (brace
//! depth respected), then each piece is expanded recursively: `#` directives
//! run inline, `$vars` substitute, and the alias table is tried in priority
//! order. Expansion bottoms out as [`Effect`]s — upstream sends and
//! `client_command` frames — in the exact order they were produced, so inline
//! side effects are visible to later commands in the same chain.

use std::sync::LazyLock;

use regex::Regex;

use crate::pattern::{Anchor, CompiledPattern};
use crate::protocol::{Alias, AliasMatchType};
use crate::scripting::escape::escape_capture;
use crate::scripting::vars::VarTable;

/// Recursive expansion stops here; whatever is left goes upstream as-is.
pub const MAX_DEPTH: usize = 10;

/// Cap for the `#N <cmd>` repeat shorthand.
pub const MAX_REPEAT: usize = 100;

/// An externally visible result of expansion, in order of production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// A line for the upstream socket (output escapes not yet applied).
    Send(String),
    /// A `#` command the browser executes (`client_command`).
    Client(String),
}

/// One expansion run over a session's alias table and variables.
pub struct Expander<'a> {
    pub aliases: &'a [Alias],
    pub vars: &'a mut VarTable,
    pub effects: Vec<Effect>,
}

#[allow(clippy::unwrap_used)] // fixed pattern
static HAS_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\d|\$\d|\$\*").unwrap());

impl<'a> Expander<'a> {
    pub fn new(aliases: &'a [Alias], vars: &'a mut VarTable) -> Self {
        Self { aliases, vars, effects: Vec::new() }
    }

    /// Split and expand a full inbound command string.
    pub fn process(&mut self, input: &str) {
        for part in split_commands(input) {
            self.expand(&part, 0);
        }
    }

    pub fn expand(&mut self, cmd: &str, depth: usize) {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return;
        }
        if depth >= MAX_DEPTH {
            self.effects.push(Effect::Send(cmd.to_owned()));
            return;
        }
        if cmd.starts_with('#') {
            crate::scripting::directives::run(self, cmd, depth);
            return;
        }

        let cmd = self.vars.substitute(cmd);

        let aliases = self.aliases;
        let mut enabled: Vec<&Alias> = aliases.iter().filter(|a| a.enabled).collect();
        enabled.sort_by_key(|a| a.priority);
        let expansion = enabled.iter().find_map(|a| try_alias(a, &cmd));

        match expansion {
            Some(expansion) => {
                for part in split_commands(&expansion) {
                    self.expand(&part, depth + 1);
                }
            }
            None => self.effects.push(Effect::Send(cmd)),
        }
    }
}

/// Try one alias against a command; returns the substituted replacement.
fn try_alias(alias: &Alias, cmd: &str) -> Option<String> {
    match alias.match_type {
        AliasMatchType::Exact => {
            let (first, rest) = split_first_word(cmd);
            if first != alias.pattern {
                return None;
            }
            let mut captures = vec![cmd.to_owned()];
            captures.extend(rest.split_whitespace().map(str::to_owned));
            let mut expansion =
                substitute_captures(&alias.replacement, &captures, rest, false, false);
            // An alias whose replacement names no argument keeps its trailing
            // args: `alias info → priest` invoked as `info general` sends
            // `priest general`.
            if !rest.is_empty() && !HAS_PLACEHOLDER.is_match(&alias.replacement) {
                expansion.push(' ');
                expansion.push_str(rest);
            }
            Some(expansion)
        }
        AliasMatchType::StartsWith => {
            let rest = cmd.strip_prefix(&alias.pattern)?.trim_start();
            let mut captures = vec![cmd.to_owned()];
            captures.extend(rest.split_whitespace().map(str::to_owned));
            Some(substitute_captures(&alias.replacement, &captures, rest, false, false))
        }
        AliasMatchType::Regex => {
            let re = match Regex::new(&alias.pattern) {
                Ok(re) => re,
                Err(e) => {
                    tracing::debug!(alias_id = %alias.id, err = %e, "bad alias regex, skipping");
                    return None;
                }
            };
            let caps = re.captures(cmd)?;
            let full = caps.get(0)?;
            let mut captures = Vec::with_capacity(caps.len());
            for i in 0..caps.len() {
                captures.push(caps.get(i).map(|m| m.as_str().to_owned()).unwrap_or_default());
            }
            let rest = cmd[full.end()..].trim();
            Some(substitute_captures(&alias.replacement, &captures, rest, true, false))
        }
        AliasMatchType::Tintin => {
            let compiled = match CompiledPattern::compile(&alias.pattern, Anchor::Start) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(alias_id = %alias.id, err = %e, "bad alias pattern, skipping");
                    return None;
                }
            };
            let m = compiled.match_with_args(cmd)?;
            let rest = cmd[m.end..].trim();
            Some(substitute_captures(&alias.replacement, &m.captures, rest, false, false))
        }
    }
}

fn split_first_word(cmd: &str) -> (&str, &str) {
    match cmd.split_once(' ') {
        Some((first, rest)) => (first, rest.trim_start()),
        None => (cmd, ""),
    }
}

/// Substitute `%N`, `$N` (regex mode), and `$*` placeholders in a template.
/// `%%` survives as a literal `%`. When `escape` is set, substituted values
/// get capture escaping (trigger bodies fed from game text).
pub fn substitute_captures(
    template: &str,
    captures: &[String],
    rest: &str,
    regex_mode: bool,
    escape: bool,
) -> String {
    let value_of = |idx: usize| -> String {
        let raw = captures.get(idx).map(String::as_str).unwrap_or("");
        if escape {
            escape_capture(raw)
        } else {
            raw.to_owned()
        }
    };

    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '%' if chars.get(i + 1) == Some(&'%') => {
                out.push('%');
                i += 2;
            }
            '%' if matches!(chars.get(i + 1), Some('0'..='9')) => {
                let mut j = i + 1;
                let mut num = String::new();
                while num.len() < 2 && matches!(chars.get(j), Some('0'..='9')) {
                    num.push(chars[j]);
                    j += 1;
                }
                if let Ok(idx) = num.parse::<usize>() {
                    out.push_str(&value_of(idx));
                }
                i = j;
            }
            '$' if chars.get(i + 1) == Some(&'*') => {
                if escape {
                    out.push_str(&escape_capture(rest));
                } else {
                    out.push_str(rest);
                }
                i += 2;
            }
            '$' if regex_mode && matches!(chars.get(i + 1), Some('0'..='9')) => {
                let mut j = i + 1;
                let mut num = String::new();
                while num.len() < 2 && matches!(chars.get(j), Some('0'..='9')) {
                    num.push(chars[j]);
                    j += 1;
                }
                if let Ok(idx) = num.parse::<usize>() {
                    out.push_str(&value_of(idx));
                }
                i = j;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Split on unescaped `;` and newlines, respecting `{...}` depth. The escape
/// backslash is kept: `\;` survives the split and is unescaped only by the
/// output pass.
pub fn split_commands(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if i + 1 < chars.len() => {
                current.push(c);
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' | '\n' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
        i += 1;
    }
    parts.push(current);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Split whitespace-delimited arguments, keeping `{...}` groups as single
/// arguments with the outer braces removed.
pub fn split_args(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                if depth > 0 {
                    current.push(c);
                }
                depth += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                if depth > 0 {
                    current.push(c);
                } else {
                    args.push(std::mem::take(&mut current));
                }
            }
            ' ' | '\t' if depth == 0 => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
        i += 1;
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

#[cfg(test)]
#[path = "aliases_tests.rs"]
mod tests;
