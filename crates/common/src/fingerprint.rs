//! Pure, stateless fingerprint derivation.
//!
//! Every function here performs no I/O and retains no state between calls;
//! the same inputs always produce the same hash.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// `base_hash = SHA-256(lowercase(trim(addr)) "|" lowercase(trim(user_agent)))`
pub fn base_hash(address: &str, user_agent: &str) -> String {
    let joined = format!(
        "{}|{}",
        address.trim().to_lowercase(),
        user_agent.trim().to_lowercase()
    );
    sha256_hex(&joined)
}

/// `behavior_hash = SHA-256(lowercase(trim(normalize(path))) "|" lowercase(trim(method)) "|" str(status))`
pub fn behavior_hash(path: &str, method: &str, status: u16) -> String {
    let joined = format!(
        "{}|{}|{}",
        normalize_path(path).trim().to_lowercase(),
        method.trim().to_lowercase(),
        status
    );
    sha256_hex(&joined)
}

/// Strip query string, remove trailing slash. Does NOT collapse numeric IDs
/// or other path-shape normalization — that happens only in the behavior
/// analyzer's separate pattern-extraction step (`extract_path_pattern`).
pub fn normalize_path(path: &str) -> String {
    let without_query = path.split('?').next().unwrap_or(path);
    if without_query.len() > 1 && without_query.ends_with('/') {
        without_query.trim_end_matches('/').to_string()
    } else {
        without_query.to_string()
    }
}

/// `identity_hash(set) = SHA-256(sorted(members).join("||"))`. `members` is
/// a set, not a multiset: duplicates are removed before sorting so a chain
/// that re-triggers on the same `base_hash` doesn't shift its `root_hash`.
pub fn identity_hash<I, S>(members: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut sorted: Vec<String> = members.into_iter().map(Into::into).collect();
    sorted.sort();
    sorted.dedup();
    sha256_hex(&sorted.join("||"))
}

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
        )
        .expect("static uuid pattern")
    })
}

fn hash_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[0-9a-f]{32,}$").expect("static hash pattern"))
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("static digits pattern"))
}

/// Replace `/<digits>` with `/{id}`, UUID-shaped segments with `/{uuid}`, and
/// 32+ hex segments with `/{hash}`. Used by the behavior analyzer for scan
/// detection and diagnostics, never by the base/behavior hashes above.
pub fn extract_path_pattern(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.is_empty() {
                segment.to_string()
            } else if digits_re().is_match(segment) {
                "{id}".to_string()
            } else if uuid_re().is_match(segment) {
                "{uuid}".to_string()
            } else if hash_segment_re().is_match(segment) {
                "{hash}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_hash_ignores_case_and_whitespace() {
        let a = base_hash("  192.0.2.1 ", "Mozilla/5.0");
        let b = base_hash("192.0.2.1", " MOZILLA/5.0 ");
        assert_eq!(a, b);
    }

    #[test]
    fn base_hash_ignores_unrelated_fields() {
        // Permuting any field besides address/UA must not change the hash.
        let a = base_hash("192.0.2.1", "curl/7.88");
        let b = base_hash("192.0.2.1", "curl/7.88");
        assert_eq!(a, b);
    }

    #[test]
    fn behavior_hash_depends_on_path_method_status() {
        let a = behavior_hash("/api/users", "GET", 200);
        let b = behavior_hash("/api/users", "GET", 404);
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_path_strips_query_and_trailing_slash() {
        assert_eq!(normalize_path("/foo/bar/?x=1"), "/foo/bar");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/foo"), "/foo");
    }

    #[test]
    fn identity_hash_is_order_independent() {
        let a = identity_hash(vec!["b", "a", "c"]);
        let b = identity_hash(vec!["c", "b", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn identity_hash_deduplicates_repeated_members() {
        // A chain re-triggering on the same base_hash must not shift root_hash.
        let a = identity_hash(vec!["h"]);
        let b = identity_hash(vec!["h", "h"]);
        assert_eq!(a, b);
    }

    #[test]
    fn identity_hash_single_member_matches_spec_scenario_3() {
        // Scenario 3: root_hash = SHA256("<base_hash>") for a lone member.
        let h = base_hash("192.0.2.5", "curl/7.88");
        let root = identity_hash(vec![h.clone()]);
        assert_eq!(root, identity_hash(std::iter::once(h)));
    }

    #[test]
    fn extract_path_pattern_collapses_ids_uuids_hashes() {
        assert_eq!(extract_path_pattern("/users/123"), "/users/{id}");
        assert_eq!(
            extract_path_pattern("/users/550e8400-e29b-41d4-a716-446655440000"),
            "/users/{uuid}"
        );
        assert_eq!(
            extract_path_pattern("/blobs/abababababababababababababababab"),
            "/blobs/{hash}"
        );
        assert_eq!(extract_path_pattern("/static/app.js"), "/static/app.js");
    }
}
