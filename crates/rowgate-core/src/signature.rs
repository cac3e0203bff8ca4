use sha1::{Digest, Sha1};

// ---------------------------------------------------------------------------
// Nonce
// ---------------------------------------------------------------------------

/// Random alphanumeric nonce included in signed page requests.
pub fn nonce(len: usize) -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Page signature
// ---------------------------------------------------------------------------

/// Deterministic signature over the ordered field set
/// `ticket, nonce, timestamp, url`, consumed by the client-side
/// page-embedding SDK. The base-string layout and SHA-1 digest are part of
/// the provider's wire contract and must not change.
pub fn page_signature(ticket: &str, nonce_str: &str, timestamp: i64, url: &str) -> String {
    let base =
        format!("jsapi_ticket={ticket}&noncestr={nonce_str}&timestamp={timestamp}&url={url}");
    let mut hasher = Sha1::new();
    hasher.update(base.as_bytes());
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        assert_eq!(
            page_signature("tkt", "abc123", 1_700_000_000, "https://example.com/page"),
            "26f33ae4236fd7c05383dab229017f54215c1aa6"
        );
    }

    #[test]
    fn signature_changes_with_each_field() {
        let base = page_signature("t", "n", 1, "u");
        assert_ne!(page_signature("x", "n", 1, "u"), base);
        assert_ne!(page_signature("t", "x", 1, "u"), base);
        assert_ne!(page_signature("t", "n", 2, "u"), base);
        assert_ne!(page_signature("t", "n", 1, "x"), base);
    }

    #[test]
    fn nonce_has_requested_length_and_charset() {
        let n = nonce(16);
        assert_eq!(n.len(), 16);
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn nonces_are_not_constant() {
        assert_ne!(nonce(32), nonce(32));
    }
}
