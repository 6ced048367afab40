//! Token generation and verification.
//!
//! Tokens are opaque URL-safe strings handed out once at encounter creation;
//! only their salted SHA-256 digest is stored. Verification hashes the
//! presented token and compares digests in constant time, so neither the
//! token length nor a digest prefix leaks through timing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 24 bytes = 192 bits of entropy per token.
const TOKEN_BYTES: usize = 24;

/// Generate a fresh URL-safe access token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Deterministic keyed digest: hex SHA-256 over `raw_token ∥ server_salt`.
pub fn hash_token(raw_token: &str, server_salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hasher.update(server_salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a raw token against a stored digest in constant time over the
/// full digest. Malformed inputs compare unequal; this never panics.
pub fn verify_token(raw_token: &str, stored_hash: &str, server_salt: &str) -> bool {
    let computed = hash_token(raw_token, server_salt);
    // `ct_eq` on slices short-circuits only on length, which is public here
    // (every stored digest is 64 hex chars).
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_url_safe_and_distinct() {
        let a = generate_token();
        let b = generate_token();

        assert_ne!(a, b);
        // 24 bytes in unpadded base64.
        assert_eq!(a.len(), 32);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_is_deterministic_per_salt() {
        assert_eq!(hash_token("tok", "salt"), hash_token("tok", "salt"));
        assert_ne!(hash_token("tok", "salt"), hash_token("tok", "pepper"));
        assert_ne!(hash_token("tok-a", "salt"), hash_token("tok-b", "salt"));
    }

    #[test]
    fn hash_is_fixed_length_hex() {
        let digest = hash_token("tok", "salt");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_accepts_matching_token() {
        let digest = hash_token("tok", "salt");
        assert!(verify_token("tok", &digest, "salt"));
    }

    #[test]
    fn verify_rejects_wrong_token_salt_or_garbage() {
        let digest = hash_token("tok", "salt");
        assert!(!verify_token("other", &digest, "salt"));
        assert!(!verify_token("tok", &digest, "pepper"));
        assert!(!verify_token("tok", "", "salt"));
        assert!(!verify_token("tok", "not-a-digest", "salt"));
        assert!(!verify_token("", &digest, "salt"));
    }
}
