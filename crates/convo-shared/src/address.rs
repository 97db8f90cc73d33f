//! Reply-address synthesis.
//!
//! Every thread and event has a deterministic inbound address of the form
//! `<slug>-<numeric id>@<domain>` so that replies can be routed back.

use crate::constants::SLUG_MAX_LEN;

/// Lowercase ASCII slug of at most `max_len` characters.
///
/// Runs of anything that is not an ASCII letter or digit collapse into a
/// single `-`; leading and trailing dashes are dropped.
pub fn slug(s: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;

    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    out.truncate(max_len);
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "convo".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn reply_address(label: &str, numeric_id: i64, domain: &str) -> String {
    format!("{}-{}@{}", slug(label, SLUG_MAX_LEN), numeric_id, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_basic() {
        assert_eq!(slug("Dinner at Mario's!", 20), "dinner-at-mario-s");
    }

    #[test]
    fn test_slug_truncates_without_trailing_dash() {
        assert_eq!(slug("The quick brown fox jumps", 20), "the-quick-brown-fox");
        assert!(slug("The quick brown fox jumps", 20).len() <= 20);
    }

    #[test]
    fn test_slug_empty_falls_back() {
        assert_eq!(slug("!!!", 20), "convo");
        assert_eq!(slug("", 20), "convo");
    }

    #[test]
    fn test_reply_address() {
        assert_eq!(
            reply_address("Weekend plans", 123, "mail.hiconvo.com"),
            "weekend-plans-123@mail.hiconvo.com"
        );
    }
}
