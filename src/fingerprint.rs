use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`; the history cache key.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_a_fingerprint() {
        let a = fingerprint(b"menu photo bytes");
        let b = fingerprint(b"menu photo bytes".to_vec().as_slice());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_bytes_differ() {
        assert_ne!(fingerprint(b"menu A"), fingerprint(b"menu B"));
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
