use sha2::{Digest, Sha256};

/// SHA-256 digest of a byte buffer as lowercase hex.
///
/// The hash is always computed over plaintext, never ciphertext, so it is
/// stable across re-encryption and serves as the content-addressed blob key.
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            digest_hex(b"hello world!"),
            "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9"
        );
    }

    #[test]
    fn test_empty_input_is_legal() {
        assert_eq!(
            digest_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_stable_across_calls() {
        let data = b"some bytes";
        assert_eq!(digest_hex(data), digest_hex(data));
        assert_eq!(digest_hex(data).len(), 64);
    }
}
