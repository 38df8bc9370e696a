use sha2::{Digest, Sha256};
use warden_core::types::{Hash256, PolicyVersionHash, RequestDigest, TokenId};

/// Compute SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    Hash256::from_bytes(arr)
}

/// Chain hash of a ledger entry: `SHA-256(previous_hash ‖ body_bytes)`.
pub fn chain_hash(previous: &Hash256, body_bytes: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(body_bytes);
    let digest = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    Hash256::from_bytes(arr)
}

/// Derive a RequestDigest from canonical request bytes.
pub fn request_digest(canonical_bytes: &[u8]) -> RequestDigest {
    RequestDigest(sha256(canonical_bytes))
}

/// Derive a PolicyVersionHash from a policy's canonical encoding.
pub fn policy_version_hash(canonical_bytes: &[u8]) -> PolicyVersionHash {
    PolicyVersionHash(sha256(canonical_bytes))
}

/// Derive a TokenId from canonical token body bytes: the first 16 bytes of
/// the SHA-256 digest.
pub fn token_id_from_body(body_bytes: &[u8]) -> TokenId {
    let digest = sha256(body_bytes);
    let mut arr = [0u8; 16];
    arr.copy_from_slice(&digest.as_bytes()[..16]);
    TokenId(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let h = sha256(b"abc");
        assert_eq!(
            h.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn chain_hash_binds_previous() {
        let body = b"entry body";
        let a = chain_hash(&Hash256::ZERO, body);
        let b = chain_hash(&Hash256::from_bytes([1u8; 32]), body);
        assert_ne!(a, b);
    }

    #[test]
    fn token_id_is_digest_prefix() {
        let body = b"token body";
        let id = token_id_from_body(body);
        assert_eq!(&sha256(body).as_bytes()[..16], id.as_bytes());
    }
}
