//! Text helpers for the resonance and consolidation paths
//!
//! Defensive cleanup for LLM output and user-facing text: query
//! sanitization for the graph backend, degenerate-loop truncation,
//! heartbeat detection, and token estimation for threshold accounting.

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{CHARS_PER_TOKEN, DEDUP_KEY_CHARS, MIN_REPETITION_WINDOW};

lazy_static! {
    /// Untrusted metadata block the host appends to raw prompts
    static ref METADATA_BLOCK: Regex =
        Regex::new(r"(?s)Conversation info \(untrusted metadata\):\s*```(?:json)?.*?```")
            .expect("metadata block regex");

    /// Machine timestamp tags embedded in memory bodies
    static ref TIMESTAMP_TAG: Regex =
        Regex::new(r"\[TIMESTAMP:[^\]]*\]").expect("timestamp tag regex");

    /// Leading list markers on LLM-emitted query lines
    static ref LIST_PREFIX: Regex =
        Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").expect("list prefix regex");
}

/// Sanitize a query for the graph backend's search engine
///
/// RediSearch-class engines reject punctuation and operator tokens, so
/// everything outside letters, numbers, whitespace, `-` and `_` is removed
/// and whitespace runs are collapsed.
pub fn sanitize_query(query: &str) -> String {
    let kept: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate degenerate LLM repetition loops
///
/// Scans for the longest window that immediately repeats itself and cuts
/// after its first occurrence, keeping windows with at least 3
/// non-whitespace chars. Applied to fixpoint so the retained prefix cannot
/// itself end in a shorter repeat.
pub fn truncate_repetitive(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    while let Some(end) = repeated_window_end(&chars) {
        chars.truncate(end);
    }
    if chars.len() == text.chars().count() {
        text.to_string()
    } else {
        chars.into_iter().collect()
    }
}

/// First position after a self-adjacent repeated window, if any
fn repeated_window_end(chars: &[char]) -> Option<usize> {
    let n = chars.len();
    if n < 2 * MIN_REPETITION_WINDOW {
        return None;
    }
    for len in (MIN_REPETITION_WINDOW..=n / 2).rev() {
        for i in 0..=(n - 2 * len) {
            if chars[i..i + len] == chars[i + len..i + 2 * len] {
                let significant = chars[i..i + len]
                    .iter()
                    .filter(|c| !c.is_whitespace())
                    .count();
                if significant >= MIN_REPETITION_WINDOW {
                    return Some(i + len);
                }
            }
        }
    }
    None
}

/// Rough token estimate for threshold accounting (~4 chars/token)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Keepalive detection
///
/// A message is a heartbeat iff it carries the heartbeat instruction and
/// acknowledgement together, or is the bare acknowledgement. Deliberately
/// string-based; no intent guessing.
pub fn is_heartbeat(text: &str) -> bool {
    (text.contains("Read HEARTBEAT.md") && text.contains("HEARTBEAT_OK"))
        || text.trim() == "HEARTBEAT_OK"
}

/// Normalized near-duplicate key: first 30 lowercase alphanumerics
pub fn dedup_key(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .take(DEDUP_KEY_CHARS)
        .collect()
}

/// Strip the host's untrusted-metadata block from a raw prompt
pub fn strip_metadata_block(prompt: &str) -> String {
    METADATA_BLOCK.replace_all(prompt, "").trim().to_string()
}

/// Strip `[TIMESTAMP:…]` noise from a memory body
pub fn strip_timestamp_tags(content: &str) -> String {
    TIMESTAMP_TAG.replace_all(content, "").trim().to_string()
}

/// Whether a body is a bare JSON object (tool payloads, not prose)
pub fn is_json_only(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

/// Clean one LLM-emitted query line: list markers and wrapping quotes off
pub fn clean_seed_line(line: &str) -> String {
    let mut cleaned = LIST_PREFIX.replace(line, "").trim().to_string();
    loop {
        let stripped = cleaned
            .trim_matches(|c| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}' | '`'))
            .trim()
            .to_string();
        if stripped == cleaned {
            break;
        }
        cleaned = stripped;
    }
    cleaned
}

/// Word count used for the story budget
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
