// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `#format` — printf-style formatting into a variable.
//!
//! Specifiers take the form `%[±width][.maxlen]<spec>`. `%%` is a literal
//! percent. Unrecognized specifiers substitute the argument unchanged, so a
//! typo degrades to pass-through rather than an error.

use crate::pattern::math;

/// Render a format string against positional arguments.
pub fn format_args(fmt: &str, args: &[String]) -> String {
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::with_capacity(fmt.len());
    let mut next_arg = 0;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'%') {
            out.push('%');
            i += 2;
            continue;
        }

        let mut j = i + 1;
        let mut left_align = false;
        if chars.get(j) == Some(&'-') {
            left_align = true;
            j += 1;
        } else if chars.get(j) == Some(&'+') {
            j += 1;
        }
        let mut width = String::new();
        while matches!(chars.get(j), Some('0'..='9')) {
            width.push(chars[j]);
            j += 1;
        }
        let mut maxlen = String::new();
        if chars.get(j) == Some(&'.') {
            j += 1;
            while matches!(chars.get(j), Some('0'..='9')) {
                maxlen.push(chars[j]);
                j += 1;
            }
        }
        let Some(&spec) = chars.get(j) else {
            out.push('%');
            i += 1;
            continue;
        };

        let arg = args.get(next_arg).map(String::as_str).unwrap_or("");
        next_arg += 1;

        let mut rendered = render(spec, arg);
        if let Ok(maxlen) = maxlen.parse::<usize>() {
            rendered = rendered.chars().take(maxlen).collect();
        }
        if let Ok(width) = width.parse::<usize>() {
            let pad = width.saturating_sub(rendered.chars().count());
            if left_align {
                rendered.push_str(&" ".repeat(pad));
            } else {
                rendered = format!("{}{rendered}", " ".repeat(pad));
            }
        }
        out.push_str(&rendered);
        i = j + 1;
    }
    out
}

fn render(spec: char, arg: &str) -> String {
    match spec {
        's' => arg.to_owned(),
        'd' => parse_int(arg).to_string(),
        'f' | 'g' => arg.trim().parse::<f64>().map(|v| v.to_string()).unwrap_or_default(),
        'u' => arg.to_uppercase(),
        'l' => arg.to_lowercase(),
        'c' => capitalize(arg),
        'p' => arg.split(' ').map(capitalize).collect::<Vec<_>>().join(" "),
        'r' => arg.chars().rev().collect(),
        'L' => arg.chars().count().to_string(),
        'x' => format!("{:x}", parse_int(arg)),
        'X' => format!("{:X}", parse_int(arg)),
        'a' => u32::try_from(parse_int(arg))
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default(),
        'A' => arg.chars().next().map(|c| (c as u32).to_string()).unwrap_or_default(),
        'm' => math::eval(arg).map(|v| v.to_string()).unwrap_or_else(|_| arg.to_owned()),
        // n/t/T/U/H/D/M/h have no server-side meaning; pass the arg through.
        _ => arg.to_owned(),
    }
}

fn parse_int(arg: &str) -> i64 {
    let trimmed = arg.trim();
    let end = trimmed
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && c == '-'))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    trimmed[..end].parse().unwrap_or(0)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
