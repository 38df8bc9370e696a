use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp in microseconds (UTC). All warden timestamps use this
/// resolution; second-resolution inputs are scaled at ingress.
pub type TimestampUs = i64;

/// Ledger sequence number per tenant chain (strictly monotonic from 1).
pub type Seq = u64;

// ── Hash256 ──────────────────────────────────────────────────────────────────

/// 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({}…)", &self.to_hex()[..16])
    }
}

// ── PolicyVersionHash ────────────────────────────────────────────────────────

/// Content hash of a policy's canonical encoding — the cryptographic identity
/// of a policy version. The human-facing `version_string` is informational
/// only and never compared during verification.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyVersionHash(pub Hash256);

impl PolicyVersionHash {
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for PolicyVersionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PolicyVersionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolicyVersionHash({}…)", &self.0.to_hex()[..16])
    }
}

// ── RequestDigest ────────────────────────────────────────────────────────────

/// SHA-256 of a validated request's canonical encoding. Used for idempotency
/// comparison and capability-token binding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestDigest(pub Hash256);

impl fmt::Display for RequestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RequestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestDigest({}…)", &self.0.to_hex()[..16])
    }
}

// ── TokenId ──────────────────────────────────────────────────────────────────

/// Capability token identifier: first 16 bytes of SHA-256(canonical body).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub [u8; 16]);

impl TokenId {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.to_hex())
    }
}

// ── Ed25519PublicKey ─────────────────────────────────────────────────────────

/// Ed25519 verification key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519PublicKey({}…)", &self.to_hex()[..16])
    }
}

/// Detached Ed25519 signature (64 bytes).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519Signature(pub Vec<u8>);

impl Ed25519Signature {
    pub const LENGTH: usize = 64;

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Signature({}b)", self.0.len())
    }
}

// ── Identifier grammar ───────────────────────────────────────────────────────

/// True iff `s` satisfies the warden identifier grammar:
/// `[A-Za-z0-9_./:-]{1,128}`. Applies to tenant, actor, action, resource,
/// data-class, rule, and request identifiers. Matching is exact and
/// case-sensitive; no normalization is performed.
pub fn is_valid_identifier(s: &str) -> bool {
    if s.is_empty() || s.len() > crate::constants::MAX_IDENTIFIER_LEN {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'/' | b':' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_grammar_accepts_typical_ids() {
        assert!(is_valid_identifier("search_web"));
        assert!(is_valid_identifier("agent/model:v2"));
        assert!(is_valid_identifier("tenant-1.example"));
    }

    #[test]
    fn identifier_grammar_rejects_bad_ids() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier("émoji"));
        assert!(!is_valid_identifier(&"x".repeat(129)));
    }

    #[test]
    fn hash_hex_round_trip() {
        let h = Hash256::from_bytes([7u8; 32]);
        assert_eq!(Hash256::from_hex(&h.to_hex()).unwrap(), h);
        assert!(Hash256::from_hex("abcd").is_err());
    }
}
