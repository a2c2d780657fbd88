//! Parser for the packaged `key=value` policy file.
//!
//! Supported syntax:
//!
//! ```text
//! # comment
//! ! also a comment
//! failover.enabled = true
//! failover.endpoint: https://backup.example.com
//! geo.blocked.countries = JP, \
//!                         TW
//! ```
//!
//! The key ends at the first unescaped `=`, `:` or whitespace; the value is
//! the rest of the line with one separator stripped. A line ending in an odd
//! number of backslashes joins the next line. Later entries override earlier
//! ones.
//!
//! Keys and values are unescaped: `\t`, `\n`, `\r`, `\f`, `\uXXXX`, and
//! `\<c>` for any other character `c` (so `https\://` reads as `https://`).
//! A malformed `\u` escape is kept as a literal `u`.

use std::collections::BTreeMap;

/// Parse properties text into a key → value map.
///
/// Never fails: lines that cannot be interpreted are skipped.
pub fn parse(text: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let line = raw.trim_start();

        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        if continues(line) {
            pending.push_str(&line[..line.len() - 1]);
            continue;
        }

        pending.push_str(line);
        let logical = std::mem::take(&mut pending);
        if let Some((key, value)) = split_entry(&logical) {
            entries.insert(key, value);
        }
    }

    // A dangling continuation on the last line still counts.
    if !pending.is_empty() {
        if let Some((key, value)) = split_entry(&pending) {
            entries.insert(key, value);
        }
    }

    entries
}

/// True if `line` ends in a backslash that is not itself escaped.
fn continues(line: &str) -> bool {
    line.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            key_end = i;
            break;
        }
    }

    let key = unescape(&line[..key_end]);
    if key.is_empty() {
        return None;
    }

    // Whitespace may surround a single `=` or `:` separator.
    let rest = line[key_end..].trim_start();
    let value = rest.strip_prefix(['=', ':']).unwrap_or(rest).trim_start();

    Some((key, unescape(value)))
}

/// Resolve backslash escapes and drop trailing unescaped whitespace.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut significant = 0;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            if !c.is_whitespace() {
                significant = out.len();
            }
            continue;
        }

        let decoded = match chars.next() {
            Some('t') => '\t',
            Some('n') => '\n',
            Some('r') => '\r',
            Some('f') => '\u{c}',
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                let code = (hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()))
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match code {
                    Some(ch) => {
                        chars.nth(3);
                        ch
                    }
                    None => 'u',
                }
            }
            Some(other) => other,
            None => break,
        };
        out.push(decoded);
        significant = out.len();
    }

    out.truncate(significant);
    out
}

/// Split a comma-separated value, trimming entries and dropping empty ones.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
