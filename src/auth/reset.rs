use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A freshly minted reset token. `raw` goes out by email exactly once;
/// only `hash` may be persisted.
pub struct ResetToken {
    pub raw: String,
    pub hash: String,
}

/// 32 random bytes, URL-safe encoded so the token survives a path segment.
pub fn generate() -> ResetToken {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = URL_SAFE_NO_PAD.encode(bytes);
    let hash = digest(&raw);
    ResetToken { raw, hash }
}

/// SHA-256 hex digest used for storage and lookup.
pub fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest("token"), digest("token"));
        assert_ne!(digest("token"), digest("other"));
    }

    #[test]
    fn generated_hash_matches_raw_digest() {
        let token = generate();
        assert_eq!(token.hash, digest(&token.raw));
    }

    #[test]
    fn tokens_are_unique_and_path_safe() {
        let a = generate();
        let b = generate();
        assert_ne!(a.raw, b.raw);
        assert!(a
            .raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
