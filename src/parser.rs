//! Statement tokenizer and number parser for spell source.
//!
//! A spell is a flat run of statements separated by periods or colons.
//! Double-quoted whispers are opaque to the splitter, so terminators
//! inside them do not end a statement. Number literals may spell the
//! decimal mark as the word `point`, since a literal `.` would end the
//! statement; a plain `.` is still accepted for text that never passed
//! through the tokenizer.

use crate::error::SpellError;
use crate::value::Value;
use num_bigint::BigInt;

/// Split spell text into trimmed statement strings, terminators retained.
///
/// Whitespace runs (including newlines) are first collapsed to single
/// spaces, so a statement may span any number of source lines. Statements
/// with no content before their terminator are discarded.
pub fn tokenize(source: &str) -> Vec<String> {
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_whispers = false;
    for ch in collapsed.chars() {
        match ch {
            '"' => {
                in_whispers = !in_whispers;
                current.push(ch);
            }
            '.' | ':' if !in_whispers => {
                let body = current.trim();
                if !body.is_empty() {
                    statements.push(format!("{body}{ch}"));
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

/// Parse a surface word run as a number literal.
///
/// `3 point 14` is the floating literal 3.14; a marker (word or `.`) makes
/// the literal floating, its absence makes it an integer.
pub fn parse_number(raw: &str) -> Result<Value, SpellError> {
    let trimmed = raw.trim();
    let malformed = || SpellError::Value(format!("malformed number {trimmed}"));
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let literal = match words.as_slice() {
        [single] => (*single).to_string(),
        [whole, point, fraction] if point.eq_ignore_ascii_case("point") => {
            format!("{whole}.{fraction}")
        }
        _ => return Err(malformed()),
    };
    if literal.contains('.') {
        literal.parse::<f64>().map(Value::Floating).map_err(|_| malformed())
    } else {
        literal.parse::<BigInt>().map(Value::Integer).map_err(|_| malformed())
    }
}

/// Byte offset of the first case-insensitive occurrence of `needle`.
///
/// The needle must be ASCII (every surface phrase is), which keeps the
/// returned offset on a character boundary of `haystack`.
pub(crate) fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Byte offset of the last case-insensitive occurrence of `needle`.
pub(crate) fn rfind_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).rev().find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Split on every case-insensitive occurrence of `separator`.
pub(crate) fn split_ci<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(at) = find_ci(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + separator.len()..];
    }
    parts.push(rest);
    parts
}

/// The text after `prefix` when `text` starts with it, case-insensitively.
pub(crate) fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    match find_ci(text, prefix) {
        Some(0) => Some(&text[prefix.len()..]),
        _ => None,
    }
}

/// Remove every whole-word occurrence of `word`, leaving the surrounding
/// characters (including both neighboring spaces) in place.
pub(crate) fn strip_word(text: &str, word: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_alphanumeric() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let token: String = chars[start..i].iter().collect();
            if !token.eq_ignore_ascii_case(word) {
                out.push_str(&token);
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// The inner text of `whispers of "..."` when the whole input is one
/// whispers literal: the first quote after the opener must be the final
/// character. Anything else is left to the phrase rules.
pub(crate) fn whispers_literal(text: &str) -> Option<&str> {
    const OPENER: &str = "whispers of \"";
    let inner = strip_prefix_ci(text.trim(), OPENER)?;
    let quote = inner.find('"')?;
    if quote == inner.len() - 1 {
        Some(&inner[..quote])
    } else {
        None
    }
}
