//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

/// Parse a comma-joined integer list as stored in `show_group_list` and
/// `main_content`. Blank and non-numeric entries are skipped.
pub fn parse_id_list(text: &str) -> Vec<i64> {
    text.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Join ids back into the stored comma-separated form
pub fn join_id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Remove every whitespace character, including interior ones
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Advance `cursor` through a ring of `len` slots, calling `visit` on each
/// position until it yields a value or one full cycle has been made.
///
/// The cursor always ends on the slot after the last one visited, so a
/// failed cycle leaves it where it started. An empty ring yields `None`.
pub fn rotate<T>(
    cursor: &mut usize,
    len: usize,
    mut visit: impl FnMut(usize) -> Option<T>,
) -> Option<T> {
    if len == 0 {
        *cursor = 0;
        return None;
    }
    *cursor %= len;
    for _ in 0..len {
        let at = *cursor;
        *cursor = (at + 1) % len;
        if let Some(hit) = visit(at) {
            return Some(hit);
        }
    }
    None
}
