//! ETag computation and `If-None-Match` handling (§4.4.1, §4.4.2, testable property 1-2).

use axum::http::HeaderValue;
use sha1::{Digest, Sha1};

/// `hex(sha1(body))`, used for single-resource reads.
pub fn etag_for_body(body: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(body);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// `hex(sha1(body)) + hex(total_count)`, used for listings (§4.4.2).
pub fn etag_for_listing(body: &[u8], total_count: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(body);
    format!(
        "\"{}{}\"",
        hex::encode(hasher.finalize()),
        hex::encode(total_count.to_be_bytes())
    )
}

/// `If-None-Match` accepts a comma-separated list of quoted ETags, or `*`.
pub fn if_none_match_matches(header: &HeaderValue, current_etag: &str) -> bool {
    let Ok(value) = header.to_str() else {
        return false;
    };
    if value.trim() == "*" {
        return true;
    }
    value
        .split(',')
        .map(|tok| tok.trim())
        .any(|tok| tok == current_etag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bodies_yield_identical_etags() {
        assert_eq!(etag_for_body(b"hello"), etag_for_body(b"hello"));
    }

    #[test]
    fn different_bodies_yield_different_etags() {
        assert_ne!(etag_for_body(b"hello"), etag_for_body(b"goodbye"));
    }

    #[test]
    fn wildcard_matches_anything() {
        let header = HeaderValue::from_static("*");
        assert!(if_none_match_matches(&header, "\"deadbeef\""));
    }

    #[test]
    fn comma_separated_list_matches_any_member() {
        let header = HeaderValue::from_static("\"aaa\", \"bbb\", \"ccc\"");
        assert!(if_none_match_matches(&header, "\"bbb\""));
        assert!(!if_none_match_matches(&header, "\"zzz\""));
    }

    #[test]
    fn listing_etag_changes_with_total_count() {
        let a = etag_for_listing(b"[]", 0);
        let b = etag_for_listing(b"[]", 1);
        assert_ne!(a, b);
    }
}
