//! Building identifier normalization
//!
//! The three source datasets (raw geometry, feature table, prediction table)
//! identify the same building with different string shapes:
//! `"bag_0518100000271783"`, `"NL.IMBAG.Pand.0518100000271783"`, or a bare
//! numeric code with or without zero padding. Every component that compares
//! identifiers goes through [`normalize`] so "same building" decisions are
//! made in exactly one place.

/// Minimum length for a digit run to count as the embedded numeric code
const MIN_DIGIT_RUN: usize = 10;

/// Width bare numeric codes are zero-padded to in some datasets
pub const PADDED_WIDTH: usize = 16;

/// Separators used by prefixed and namespaced identifier formats
const SEPARATORS: &[char] = &['_', '.', '-', ':'];

/// Canonicalize a building identifier into a comparable key.
///
/// Pure and total:
/// 1. If the string contains a run of at least 10 consecutive ASCII digits,
///    the first such run is the key.
/// 2. Otherwise, if the string contains a separator, the segment after the
///    last separator is the key.
/// 3. Otherwise the string is returned unchanged.
pub fn normalize(id: &str) -> String {
    if let Some(run) = first_digit_run(id, MIN_DIGIT_RUN) {
        return run.to_string();
    }

    if let Some(pos) = id.rfind(SEPARATORS) {
        let tail = &id[pos + 1..];
        if !tail.is_empty() {
            return tail.to_string();
        }
    }

    id.to_string()
}

/// Find the first run of at least `min_len` consecutive ASCII digits
fn first_digit_run(s: &str, min_len: usize) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut start = None;

    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(st) = start.take() {
            if i - st >= min_len {
                return Some(&s[st..i]);
            }
        }
    }

    if let Some(st) = start {
        if bytes.len() - st >= min_len {
            return Some(&s[st..]);
        }
    }

    None
}

/// Normalized id with leading zeros stripped.
///
/// An all-zero id collapses to `"0"` rather than the empty string.
pub fn strip_leading_zeros(normalized: &str) -> String {
    let stripped = normalized.trim_start_matches('0');
    if stripped.is_empty() && !normalized.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Normalized id left-zero-padded to [`PADDED_WIDTH`] digits.
///
/// Ids already at or beyond the width are returned unchanged.
pub fn pad_to_width(normalized: &str) -> String {
    if normalized.len() >= PADDED_WIDTH {
        normalized.to_string()
    } else {
        format!("{:0>width$}", normalized, width = PADDED_WIDTH)
    }
}
