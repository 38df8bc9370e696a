use serde::{Deserialize, Serialize};

use crate::types::{Ed25519Signature, PolicyVersionHash, RequestDigest, TimestampUs, TokenId};

/// A short-lived capability token minted on Allow and presented to the
/// downstream tool runtime.
///
/// `token_id` is the hex display of the first 16 bytes of SHA-256 over the
/// canonical body (all fields except `signature`). The wire form is
/// canonical body bytes followed by the 64-byte signature. Tokens are not
/// revocable inside their TTL; shortening the TTL is the revocation
/// mechanism.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityToken {
    pub token_id: TokenId,

    /// Binds the token to the exact request that earned it.
    pub request_digest: RequestDigest,

    pub actor_id: String,
    pub action_id: String,
    pub data_class: Option<String>,

    pub issued_at: TimestampUs,

    /// `expires_at - issued_at <= policy.default_token_ttl <= 30 min`.
    /// Downstream verifiers treat this field as the authority; the core makes
    /// no claim about the verifier's clock.
    pub expires_at: TimestampUs,

    /// The policy version that produced the underlying Allow.
    pub policy_version_hash: PolicyVersionHash,

    /// Ed25519 signature over the canonical body.
    pub signature: Ed25519Signature,
}

impl CapabilityToken {
    pub fn is_expired(&self, now_us: TimestampUs) -> bool {
        now_us >= self.expires_at
    }

    pub fn ttl_secs(&self) -> i64 {
        (self.expires_at - self.issued_at) / crate::constants::MICROS_PER_SEC
    }
}

/// Result of verifying a presented token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenVerification {
    pub valid: bool,
    /// Machine-readable reason when invalid ("signature_invalid",
    /// "expired", "decode_error", "unknown_signer").
    pub reason: Option<String>,
    pub bound_policy_version_hash: Option<PolicyVersionHash>,
}

impl TokenVerification {
    pub fn valid(hash: PolicyVersionHash) -> Self {
        Self {
            valid: true,
            reason: None,
            bound_policy_version_hash: Some(hash),
        }
    }

    pub fn invalid(reason: impl Into<String>, hash: Option<PolicyVersionHash>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            bound_policy_version_hash: hash,
        }
    }
}
