//! Extraction of stream selector groups from query text
//!
//! Each `{...}` stream selector is one group. A range aggregation's
//! `[range]` and an `offset` modifier following the selector are attached
//! to it so the statistics window can be widened or shifted accordingly.

use crate::error::{QueryError, Result};
use logfront_core::{duration_millis, parse_duration};

/// One stream selector and the window adjustments that apply to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherGroup {
    /// Selector text including braces, e.g. `{app="foo"}`
    pub selector: String,
    /// Range of the enclosing range aggregation, 0 for log queries
    pub range_ms: i64,
    /// Offset modifier, 0 if absent
    pub offset_ms: i64,
}

/// Extract the distinct matcher groups of `query` in order of appearance
pub fn extract_matcher_groups(query: &str) -> Result<Vec<MatcherGroup>> {
    let bytes = query.as_bytes();
    let mut groups: Vec<MatcherGroup> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'`' => i = skip_string(bytes, i),
            b'{' => {
                let close = find_closing_brace(bytes, i).ok_or_else(|| {
                    QueryError::InvalidRequest(format!("unterminated stream selector in '{}'", query))
                })?;
                let selector = query[i..=close].to_string();
                let (range_ms, offset_ms) = scan_modifiers(query, close + 1)?;
                let group = MatcherGroup {
                    selector,
                    range_ms,
                    offset_ms,
                };
                if !groups.contains(&group) {
                    groups.push(group);
                }
                i = close + 1;
            }
            _ => i += 1,
        }
    }

    if groups.is_empty() {
        return Err(QueryError::InvalidRequest(format!(
            "query '{}' has no stream selector",
            query
        )));
    }
    Ok(groups)
}

/// Index just past the string literal starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote == b'"' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn find_closing_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'`' => i = skip_string(bytes, i),
            b'}' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Scan forward from the end of a selector for `[range]` and `offset d`.
///
/// Scanning stops at the parenthesis closing the selector's enclosing
/// expression or at the next selector.
fn scan_modifiers(query: &str, from: usize) -> Result<(i64, i64)> {
    let bytes = query.as_bytes();
    let mut depth = 0i32;
    let mut range_ms = 0;
    let mut offset_ms = 0;
    let mut i = from;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'`' => i = skip_string(bytes, i),
            b'{' => break,
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                i += 1;
            }
            b'[' if depth == 0 => {
                let close = query[i..].find(']').map(|p| i + p).ok_or_else(|| {
                    QueryError::InvalidRequest(format!("unterminated range in '{}'", query))
                })?;
                range_ms = parse_query_duration(&query[i + 1..close])?;
                i = close + 1;
            }
            b'o' if depth == 0 && is_keyword(query, i, "offset") => {
                let rest = &query[i + "offset".len()..];
                let trimmed = rest.trim_start();
                let len = trimmed
                    .find(|c: char| !c.is_ascii_alphanumeric())
                    .unwrap_or(trimmed.len());
                offset_ms = parse_query_duration(&trimmed[..len])?;
                i = query.len() - trimmed.len() + len;
            }
            _ => i += 1,
        }
    }

    Ok((range_ms, offset_ms))
}

fn is_keyword(query: &str, at: usize, word: &str) -> bool {
    let bytes = query.as_bytes();
    if !query[at..].starts_with(word) {
        return false;
    }
    let before_ok = at == 0 || !is_ident_byte(bytes[at - 1]);
    let after = at + word.len();
    let after_ok = after < bytes.len() && bytes[after].is_ascii_whitespace();
    before_ok && after_ok
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn parse_query_duration(s: &str) -> Result<i64> {
    parse_duration(s)
        .map(duration_millis)
        .map_err(|e| QueryError::InvalidRequest(e.to_string()))
}
