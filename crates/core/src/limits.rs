//! Size limits applied to hit fields.
//!
//! Imported data and live traffic are truncated (or, for export rows,
//! rejected) against these limits before entering the hit buffer. The
//! `#[validate]` derive on export rows requires literal values, so the
//! limits are duplicated there. Keep both in sync when modifying.

/// Path max length. Longer paths are truncated at a char boundary.
pub const MAX_PATH_LEN: usize = 2048;

/// Referrer max length.
pub const MAX_REF_LEN: usize = 2048;

/// User agent string max length.
/// Browser UAs: 100-300 typical, 500+ with extensions.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// Screen size descriptor max length ("1920,1080,2").
pub const MAX_SIZE_LEN: usize = 64;

/// Location code max length ("US-CA").
pub const MAX_LOCATION_LEN: usize = 8;

/// Truncate a string to at most `max` bytes without splitting a char.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
