// src/oracle/decode.rs
//! Resilient decoder for oracle output. The oracle is asked for JSON but
//! replies in free text: well-formed, wrapped in prose or code fences, or
//! truncated mid-object when the token budget runs out. An ordered chain of
//! increasingly permissive strategies recovers what it can; each strategy
//! is a pure function and a failure is a normal return value.

use serde_json::Value;
use tracing::warn;

/// Strategy (a): the raw text is already valid JSON.
fn parse_direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

/// Strategy (b): strip a leading/trailing fenced code block and parse the
/// remainder.
fn parse_fenced(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let start = trimmed.find("```")?;
    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json", "JSON", ...) up to the newline.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.rfind("```")?;
    serde_json::from_str(body[..end].trim()).ok()
}

/// Strategy (c): scan for the first `[` or `{` and parse up to its matching
/// close bracket by depth counting. Not string-literal aware: a bracket
/// inside a quoted value can mis-align the scan. Preserved as-is; the
/// salvage strategy below usually catches what this one misses.
fn parse_balanced(raw: &str) -> Option<Value> {
    let start = raw.find(['[', '{'])?;
    let bytes = raw.as_bytes();
    let open = bytes[start];
    let close = if open == b'[' { b']' } else { b'}' };

    let mut depth = 0usize;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                let candidate = &raw[start..=start + offset];
                return serde_json::from_str(candidate).ok();
            }
        }
    }
    None
}

/// Strategy (d): the text looks like an array that was cut off mid-object.
/// Walk `}` positions from the end backwards and try closing the array
/// after each one; the first candidate that parses to a non-empty array
/// wins. This salvages every complete record that survived truncation.
fn salvage_truncated_array(raw: &str) -> Option<Value> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('[') {
        return None;
    }
    for (pos, _) in trimmed.rmatch_indices('}') {
        let mut candidate = String::with_capacity(pos + 2);
        candidate.push_str(&trimmed[..=pos]);
        candidate.push(']');
        if let Ok(Value::Array(records)) = serde_json::from_str::<Value>(&candidate) {
            if !records.is_empty() {
                return Some(Value::Array(records));
            }
        }
    }
    None
}

/// Recover a structured value from free-text oracle output. Strategies are
/// tried in order, first success wins. `None` means "no structured data";
/// callers fall back to a coarse-derived default rather than failing.
pub fn decode(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    let decoded = parse_direct(raw)
        .or_else(|| parse_fenced(raw))
        .or_else(|| parse_balanced(raw))
        .or_else(|| salvage_truncated_array(raw));
    if decoded.is_none() {
        let preview: String = raw.chars().take(200).collect();
        warn!(%preview, "oracle response yielded no structured data");
    }
    decoded
}

/// Array-of-records convenience: an object or missing data decodes to an
/// empty list.
pub fn decode_records(raw: &str) -> Vec<Value> {
    match decode(raw) {
        Some(Value::Array(records)) => records,
        Some(Value::Object(obj)) => match obj.get("items") {
            Some(Value::Array(records)) => records.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
