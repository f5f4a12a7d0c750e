// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MUD wildcard pattern language compiled to regex.
//!
//! Trigger and alias patterns use `%`-prefixed wildcards (`%*`, `%d`, `%w`,
//! ...) instead of raw regex. Compilation translates each wildcard to a
//! capturing group, escaping everything else, with one twist: a wildcard is
//! lazy when more pattern text follows it and greedy when it is the last
//! element. `{...}` embeds a raw regex fragment as a capturing group.

pub mod math;

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::unwrap_used)] // fixed pattern
static ANSI_SGR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// Strip ANSI SGR sequences from a line. Matching always runs against the
/// stripped copy; output keeps the colored original.
pub fn strip_ansi(s: &str) -> String {
    ANSI_SGR.replace_all(s, "").into_owned()
}

/// How the compiled regex is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Search anywhere in the line (trigger matching).
    None,
    /// Anchored at line start; trailing input becomes extra arguments
    /// (alias matching).
    Start,
}

/// Return true if a trigger pattern should be compiled as a wildcard pattern
/// rather than matched as a literal substring.
pub fn is_wildcard_pattern(pattern: &str) -> bool {
    if pattern.starts_with('^') || pattern.ends_with('$') {
        return true;
    }
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'%' | b'{' | b'}' => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

#[derive(Debug, Clone)]
enum Elem {
    /// Literal text, regex-escaped at emit time.
    Literal(String),
    /// A quantified wildcard group.
    Wild { body: WildBody, capture: bool },
    /// `{...}` raw regex fragment.
    Embedded { src: String, capture: bool },
    /// `%c` — consumes ANSI SGR sequences, never captures.
    AnsiRun,
    AnchorStart,
    AnchorEnd,
}

#[derive(Debug, Clone)]
enum WildBody {
    /// `%*` and numbered `%0..%99`: any run, possibly empty.
    Any,
    /// `%+`: one or more of anything.
    OnePlus,
    /// `%?`: zero or one of anything.
    Opt,
    /// `%.`: exactly one character.
    One,
    /// Character-class run (`%d`, `%w`, `%s`, ...), one or more.
    Class(char),
    /// `%+min..max<type>` / `%+min<type>` bounded run.
    Range { min: u32, max: Option<u32>, class: char },
}

/// Compiled pattern plus the regex source it was built from.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    source: String,
}

/// Result of matching a line: `%0` is the full match, `%1..` the captures.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub captures: Vec<String>,
    pub start: usize,
    pub end: usize,
}

impl CompiledPattern {
    /// Compile a wildcard pattern. Matching runs case-sensitively against
    /// ANSI-stripped input.
    pub fn compile(pattern: &str, anchor: Anchor) -> anyhow::Result<Self> {
        let elems = tokenize(pattern)?;
        let source = emit(&elems, anchor);
        let regex = Regex::new(&source)?;
        Ok(Self { regex, source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Match against a (pre-stripped) line.
    pub fn match_line(&self, line: &str) -> Option<PatternMatch> {
        let caps = self.regex.captures(line)?;
        let full = caps.get(0)?;
        let mut captures = Vec::with_capacity(caps.len());
        captures.push(full.as_str().to_owned());
        for i in 1..caps.len() {
            captures.push(caps.get(i).map(|m| m.as_str().to_owned()).unwrap_or_default());
        }
        Some(PatternMatch { captures, start: full.start(), end: full.end() })
    }

    /// Match in alias mode: trailing input after the matched prefix is split
    /// on whitespace and appended as extra numbered arguments.
    pub fn match_with_args(&self, input: &str) -> Option<PatternMatch> {
        let mut m = self.match_line(input)?;
        let rest = input[m.end..].trim();
        if !rest.is_empty() {
            m.captures.extend(rest.split_whitespace().map(str::to_owned));
        }
        Some(m)
    }
}

fn tokenize(pattern: &str) -> anyhow::Result<Vec<Elem>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut elems = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, elems: &mut Vec<Elem>| {
        if !literal.is_empty() {
            elems.push(Elem::Literal(std::mem::take(literal)));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '^' if i == 0 => {
                elems.push(Elem::AnchorStart);
                i += 1;
            }
            '$' if i == chars.len() - 1 => {
                flush(&mut literal, &mut elems);
                elems.push(Elem::AnchorEnd);
                i += 1;
            }
            '\\' if i + 1 < chars.len() => {
                literal.push(chars[i + 1]);
                i += 2;
            }
            '{' => {
                flush(&mut literal, &mut elems);
                let (src, consumed) = scan_braced(&chars[i..])?;
                elems.push(Elem::Embedded { src, capture: true });
                i += consumed;
            }
            '%' => {
                let (elem, consumed) = scan_wildcard(&chars[i..])?;
                match elem {
                    Some(e) => {
                        flush(&mut literal, &mut elems);
                        elems.push(e);
                    }
                    // Case toggles (%u/%U/%i/%I) are consumed and ignored.
                    None if consumed > 1 => {}
                    // Bare '%' with no recognized suffix stays literal.
                    None => literal.push('%'),
                }
                i += consumed;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut elems);
    Ok(elems)
}

/// Scan a `%`-introduced wildcard starting at `chars[0] == '%'`.
/// Returns the element (None for ignored toggles / bare `%`) and the number
/// of chars consumed.
fn scan_wildcard(chars: &[char]) -> anyhow::Result<(Option<Elem>, usize)> {
    let mut capture = true;
    let mut i = 1;

    if chars.get(i) == Some(&'!') {
        capture = false;
        i += 1;
    }

    let Some(&c) = chars.get(i) else {
        return Ok((None, 1));
    };

    let elem = match c {
        '*' => Elem::Wild { body: WildBody::Any, capture },
        '+' => {
            // Possible bounded range: %+min..max<type> or %+min<type>.
            if let Some((range, extra)) = scan_range(&chars[i + 1..]) {
                i += extra;
                Elem::Wild { body: range, capture }
            } else {
                Elem::Wild { body: WildBody::OnePlus, capture }
            }
        }
        '?' => Elem::Wild { body: WildBody::Opt, capture },
        '.' => Elem::Wild { body: WildBody::One, capture },
        'd' | 'D' | 'w' | 'W' | 's' | 'S' | 'a' | 'A' | 'p' | 'P' => {
            Elem::Wild { body: WildBody::Class(c), capture }
        }
        'c' => Elem::AnsiRun,
        'u' | 'U' | 'i' | 'I' => return Ok((None, i + 1)),
        '{' => {
            let (src, consumed) = scan_braced(&chars[i..])?;
            return Ok((Some(Elem::Embedded { src, capture }), i + consumed));
        }
        '0'..='9' => {
            // Numbered any-run %0..%99.
            let mut digits = 1;
            if matches!(chars.get(i + 1), Some('0'..='9')) {
                digits = 2;
            }
            return Ok((Some(Elem::Wild { body: WildBody::Any, capture }), i + digits));
        }
        _ => return Ok((None, 1)),
    };
    Ok((Some(elem), i + 1))
}

/// Scan `min..max<type>` or `min<type>` after `%+`. Returns the range body
/// and chars consumed, or `None` if the text does not form a range.
fn scan_range(chars: &[char]) -> Option<(WildBody, usize)> {
    let mut i = 0;
    let mut min = String::new();
    while matches!(chars.get(i), Some('0'..='9')) {
        min.push(chars[i]);
        i += 1;
    }
    if min.is_empty() {
        return None;
    }
    let min: u32 = min.parse().ok()?;

    let mut max = None;
    if chars.get(i) == Some(&'.') && chars.get(i + 1) == Some(&'.') {
        i += 2;
        let mut digits = String::new();
        while matches!(chars.get(i), Some('0'..='9')) {
            digits.push(chars[i]);
            i += 1;
        }
        max = Some(digits.parse().ok()?);
    }

    let class = match chars.get(i) {
        Some(&c) if matches!(c, 'd' | 'D' | 'w' | 'W' | 's' | 'S' | 'a' | 'A' | 'p' | 'P' | '.') => {
            c
        }
        _ => return None,
    };
    Some((WildBody::Range { min, max, class }, i + 1))
}

/// Scan a `{...}` fragment starting at `chars[0] == '{'`, honoring nesting
/// and backslash escapes. Returns the inner source and chars consumed.
fn scan_braced(chars: &[char]) -> anyhow::Result<(String, usize)> {
    let mut depth = 0usize;
    let mut src = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if i + 1 < chars.len() => {
                if depth > 0 {
                    src.push(c);
                    src.push(chars[i + 1]);
                }
                i += 2;
                continue;
            }
            '{' => {
                depth += 1;
                if depth > 1 {
                    src.push(c);
                }
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((src, i + 1));
                }
                src.push(c);
            }
            _ => src.push(c),
        }
        i += 1;
    }
    anyhow::bail!("unterminated {{...}} in pattern")
}

/// Character class source for a class wildcard.
fn class_source(c: char) -> &'static str {
    match c {
        'd' => "[0-9]",
        'D' => "[^0-9]",
        'w' => "[A-Za-z0-9_]",
        'W' => "[^A-Za-z0-9_]",
        // %s is an arbitrary run (it may span spaces); %S excludes whitespace.
        's' | '.' => ".",
        'S' => "[^ \\t]",
        'a' => "[A-Za-z]",
        'A' => "[^A-Za-z]",
        'p' => "[\\x20-\\x7e]",
        'P' => "[^\\x20-\\x7e]",
        _ => ".",
    }
}

fn emit(elems: &[Elem], anchor: Anchor) -> String {
    // A wildcard is greedy only when nothing but the end anchor follows it;
    // every earlier quantifier stays lazy.
    let last_effective = elems.iter().rposition(|e| !matches!(e, Elem::AnchorEnd));

    let mut out = String::new();
    let explicit_start = matches!(elems.first(), Some(Elem::AnchorStart));
    if anchor == Anchor::Start && !explicit_start {
        out.push('^');
    }

    for (idx, elem) in elems.iter().enumerate() {
        match elem {
            Elem::Literal(text) => out.push_str(&regex::escape(text)),
            Elem::Embedded { src, capture } => {
                if *capture {
                    out.push('(');
                } else {
                    out.push_str("(?:");
                }
                out.push_str(src);
                out.push(')');
            }
            Elem::AnsiRun => out.push_str("(?:\\x1b\\[[0-9;]*m)*"),
            Elem::AnchorStart => out.push('^'),
            Elem::AnchorEnd => out.push('$'),
            Elem::Wild { body, capture } => {
                let greedy = last_effective == Some(idx);
                let lazy_mark = if greedy { "" } else { "?" };
                let open = if *capture { "(" } else { "(?:" };
                match body {
                    WildBody::Any => {
                        out.push_str(open);
                        out.push_str(".*");
                        out.push_str(lazy_mark);
                        out.push(')');
                    }
                    WildBody::OnePlus => {
                        out.push_str(open);
                        out.push_str(".+");
                        out.push_str(lazy_mark);
                        out.push(')');
                    }
                    WildBody::Opt => {
                        out.push_str(open);
                        out.push_str(".?");
                        out.push_str(lazy_mark);
                        out.push(')');
                    }
                    WildBody::One => {
                        out.push_str(open);
                        out.push('.');
                        out.push(')');
                    }
                    WildBody::Class(c) => {
                        out.push_str(open);
                        out.push_str(class_source(*c));
                        out.push('+');
                        out.push_str(lazy_mark);
                        out.push(')');
                    }
                    WildBody::Range { min, max, class } => {
                        out.push_str(open);
                        out.push_str(class_source(*class));
                        match max {
                            Some(max) => out.push_str(&format!("{{{min},{max}}}")),
                            None => out.push_str(&format!("{{{min},}}")),
                        }
                        out.push_str(lazy_mark);
                        out.push(')');
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
