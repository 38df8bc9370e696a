use serde::{Deserialize, Serialize};

use crate::decision::Verdict;
use crate::types::{
    Ed25519Signature, Hash256, PolicyVersionHash, RequestDigest, Seq, TimestampUs, TokenId,
};

// ── EventType ────────────────────────────────────────────────────────────────

/// Ledger event kind. The tag byte is part of the canonical entry body.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    Decision,
    PolicyLoaded,
}

impl EventType {
    pub fn tag(self) -> u8 {
        match self {
            EventType::Decision => 1,
            EventType::PolicyLoaded => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EventType::Decision),
            2 => Some(EventType::PolicyLoaded),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Decision => "decision",
            EventType::PolicyLoaded => "policy_loaded",
        }
    }
}

// ── LedgerEntry ──────────────────────────────────────────────────────────────

/// One immutable, numbered record of a tenant's hash chain.
///
/// `entry_hash = SHA-256(previous_hash ‖ canonical_body)` where the canonical
/// body is `u64_be seq | i64_be timestamp_us | u8 event_tag | tenant_id |
/// u32_be payload_len | payload`. The genesis entry of every chain has
/// `previous_hash` = 32 zero bytes. `signature` is Ed25519 over `entry_hash`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub seq: Seq,
    pub timestamp_us: TimestampUs,
    pub event_type: EventType,
    pub tenant_id: String,
    /// Canonical payload bytes (DecisionPayload or PolicyLoadedPayload).
    pub payload: Vec<u8>,
    pub previous_hash: Hash256,
    pub entry_hash: Hash256,
    pub signature: Ed25519Signature,
}

/// Per-tenant chain tail, updated atomically with each append.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerTail {
    pub seq: Seq,
    pub entry_hash: Hash256,
    pub timestamp_us: TimestampUs,
}

/// Receipt returned to the appender once the entry is durable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub seq: Seq,
    pub entry_hash: Hash256,
    pub signature: Ed25519Signature,
    /// The (possibly clamped) timestamp actually recorded. Under clock skew
    /// this may be later than the caller's timestamp.
    pub timestamp_us: TimestampUs,
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Ledger payload of one decision. The full reason trace stays with the
/// caller; only its digest enters the chain, keeping entries bounded.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionPayload {
    pub tenant_id: String,
    pub decision_id: String,
    pub request_digest: RequestDigest,
    pub verdict: Verdict,
    pub reason_trace_digest: Hash256,
    pub policy_version_hash: PolicyVersionHash,
    pub token_id: Option<TokenId>,
    pub issued_at: TimestampUs,
    pub expires_at: Option<TimestampUs>,
}

/// Ledger payload of a successful policy publication.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyLoadedPayload {
    pub policy_id: String,
    pub version_hash: PolicyVersionHash,
    pub previous_version_hash: Option<PolicyVersionHash>,
}

// ── Verification report ──────────────────────────────────────────────────────

/// Why a single entry failed verification.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerifyFailureReason {
    HashMismatch,
    SignatureInvalid,
    SeqGap,
    TimestampRegression,
    UnknownSigner,
    DecodeError,
}

impl VerifyFailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyFailureReason::HashMismatch => "hash_mismatch",
            VerifyFailureReason::SignatureInvalid => "signature_invalid",
            VerifyFailureReason::SeqGap => "seq_gap",
            VerifyFailureReason::TimestampRegression => "timestamp_regression",
            VerifyFailureReason::UnknownSigner => "unknown_signer",
            VerifyFailureReason::DecodeError => "decode_error",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyFailure {
    pub seq: Seq,
    pub reason: VerifyFailureReason,
}

/// Outcome of scanning a chain range. All failures are reported; a bad entry
/// never short-circuits the scan.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyReport {
    pub ok: bool,
    pub failures: Vec<VerifyFailure>,
    pub entries_checked: u64,
}
