//! Canonical record formats.
//!
//! Field order is fixed per record type and is part of the cross-
//! implementation wire contract. Changing any order or width here breaks
//! every stored hash and signature; treat this file as frozen format code.

use warden_core::decision::ReasonStep;
use warden_core::entry::{DecisionPayload, PolicyLoadedPayload};
use warden_core::request::{ContextValue, DecisionRequest};
use warden_core::token::CapabilityToken;
use warden_core::types::{
    Ed25519Signature, Hash256, PolicyVersionHash, RequestDigest, TimestampUs,
};
use warden_core::Verdict;

use crate::reader::{CanonicalReader, CodecError};
use crate::writer::CanonicalWriter;

// ── Context values ───────────────────────────────────────────────────────────

const CTX_TAG_STR: u8 = 0;
const CTX_TAG_INT: u8 = 1;
const CTX_TAG_BOOL: u8 = 2;

/// Tagged scalar encoding shared by request context maps and policy
/// condition parameters.
pub fn put_context_value(w: &mut CanonicalWriter, v: &ContextValue) {
    match v {
        ContextValue::Str(s) => {
            w.put_u8(CTX_TAG_STR);
            w.put_string(s);
        }
        ContextValue::Int(i) => {
            w.put_u8(CTX_TAG_INT);
            w.put_i64_be(*i);
        }
        ContextValue::Bool(b) => {
            w.put_u8(CTX_TAG_BOOL);
            w.put_u8(u8::from(*b));
        }
    }
}

/// Encode a context map as `u32_be n` followed by `n` pairs sorted
/// lexicographically on the normalized key bytes.
fn put_context_map(
    w: &mut CanonicalWriter,
    map: &std::collections::BTreeMap<String, ContextValue>,
) {
    use unicode_normalization::UnicodeNormalization;
    let mut pairs: Vec<(String, &ContextValue)> = map
        .iter()
        .map(|(k, v)| (k.nfc().collect::<String>(), v))
        .collect();
    pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    w.put_u32_be(pairs.len() as u32);
    for (key, value) in pairs {
        w.put_string(&key);
        put_context_value(w, value);
    }
}

/// Canonical bytes of a context map alone. Used for the ingress size bound;
/// identical framing to the map's appearance inside a request encoding.
pub fn encode_context(map: &std::collections::BTreeMap<String, ContextValue>) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(64);
    put_context_map(&mut w, map);
    w.into_bytes()
}

// ── DecisionRequest ──────────────────────────────────────────────────────────

/// Canonical encoding of a validated request:
/// `tenant_id | actor_id | action_id | resource_id? | data_class? |
///  sorted_map(context) | risk_level? (u8) | i64 wall_clock_us | request_id`.
pub fn encode_request(req: &DecisionRequest) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(256);
    w.put_string(&req.tenant_id);
    w.put_string(&req.actor_id);
    w.put_string(&req.action_id);
    w.put_opt(req.resource_id.as_ref(), |w, s| w.put_string(s));
    w.put_opt(req.data_class.as_ref(), |w, s| w.put_string(s));
    put_context_map(&mut w, &req.context);
    w.put_opt(req.risk_level.as_ref(), |w, r| w.put_u8(*r));
    w.put_i64_be(req.wall_clock_us);
    w.put_string(&req.request_id);
    w.into_bytes()
}

// ── Reason trace ─────────────────────────────────────────────────────────────

/// Canonical encoding of a reason trace, input to the trace digest.
pub fn encode_reason_trace(trace: &[ReasonStep]) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(64);
    w.put_u32_be(trace.len() as u32);
    for step in trace {
        w.put_string(&step.rule_id);
        w.put_u8(step.role.tag());
        w.put_opt(step.detail.as_ref(), |w, s| w.put_string(s));
    }
    w.into_bytes()
}

// ── Capability token ─────────────────────────────────────────────────────────

/// Canonical token body: every field except `token_id` and `signature`.
/// `token_id` is derived from the SHA-256 of exactly these bytes.
pub fn encode_token_body(token: &CapabilityToken) -> Vec<u8> {
    encode_token_body_fields(
        &token.request_digest,
        &token.actor_id,
        &token.action_id,
        token.data_class.as_deref(),
        token.issued_at,
        token.expires_at,
        &token.policy_version_hash,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn encode_token_body_fields(
    request_digest: &RequestDigest,
    actor_id: &str,
    action_id: &str,
    data_class: Option<&str>,
    issued_at: TimestampUs,
    expires_at: TimestampUs,
    policy_version_hash: &PolicyVersionHash,
) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(128);
    w.put_raw(request_digest.0.as_bytes());
    w.put_string(actor_id);
    w.put_string(action_id);
    w.put_opt(data_class, |w, s| w.put_string(s));
    w.put_i64_be(issued_at);
    w.put_i64_be(expires_at);
    w.put_raw(policy_version_hash.0.as_bytes());
    w.into_bytes()
}

/// Wire form of a token: canonical body ‖ 64-byte signature.
pub fn encode_token_wire(token: &CapabilityToken) -> Vec<u8> {
    let mut bytes = encode_token_body(token);
    bytes.extend_from_slice(&token.signature.0);
    bytes
}

/// A token parsed from wire form. The caller recomputes `token_id` from
/// `body` (the codec performs no hashing) and verifies `signature` over it.
#[derive(Clone, Debug)]
pub struct DecodedToken {
    pub body: Vec<u8>,
    pub request_digest: RequestDigest,
    pub actor_id: String,
    pub action_id: String,
    pub data_class: Option<String>,
    pub issued_at: TimestampUs,
    pub expires_at: TimestampUs,
    pub policy_version_hash: PolicyVersionHash,
    pub signature: Ed25519Signature,
}

pub fn decode_token_wire(bytes: &[u8]) -> Result<DecodedToken, CodecError> {
    if bytes.len() < Ed25519Signature::LENGTH {
        return Err(CodecError::UnexpectedEof(bytes.len()));
    }
    let (body, sig) = bytes.split_at(bytes.len() - Ed25519Signature::LENGTH);

    let mut r = CanonicalReader::new(body);
    let request_digest = RequestDigest(Hash256::from_bytes(r.take_array::<32>()?));
    let actor_id = r.take_string()?;
    let action_id = r.take_string()?;
    let data_class = r.take_opt(|r| r.take_string())?;
    let issued_at = r.take_i64_be()?;
    let expires_at = r.take_i64_be()?;
    let policy_version_hash = PolicyVersionHash(Hash256::from_bytes(r.take_array::<32>()?));
    r.finish()?;

    Ok(DecodedToken {
        body: body.to_vec(),
        request_digest,
        actor_id,
        action_id,
        data_class,
        issued_at,
        expires_at,
        policy_version_hash,
        signature: Ed25519Signature(sig.to_vec()),
    })
}

// ── Ledger entry body ────────────────────────────────────────────────────────

/// The hashed portion of a ledger entry:
/// `u64_be seq | i64_be timestamp_us | u8 event_tag | tenant_id |
///  u32_be payload_len | payload`.
pub fn encode_entry_body(
    seq: u64,
    timestamp_us: TimestampUs,
    event_tag: u8,
    tenant_id: &str,
    payload: &[u8],
) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(64 + payload.len());
    w.put_u64_be(seq);
    w.put_i64_be(timestamp_us);
    w.put_u8(event_tag);
    w.put_string(tenant_id);
    w.put_bytes(payload);
    w.into_bytes()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryBody {
    pub seq: u64,
    pub timestamp_us: TimestampUs,
    pub event_tag: u8,
    pub tenant_id: String,
    pub payload: Vec<u8>,
}

pub fn decode_entry_body(bytes: &[u8]) -> Result<EntryBody, CodecError> {
    let mut r = CanonicalReader::new(bytes);
    let seq = r.take_u64_be()?;
    let timestamp_us = r.take_i64_be()?;
    let event_tag = r.take_u8()?;
    let tenant_id = r.take_string()?;
    let payload = r.take_bytes()?;
    r.finish()?;
    Ok(EntryBody {
        seq,
        timestamp_us,
        event_tag,
        tenant_id,
        payload,
    })
}

// ── Decision payload ─────────────────────────────────────────────────────────

const EVENT_TAG_DECISION: u8 = 1;
const EVENT_TAG_POLICY_LOADED: u8 = 2;

pub fn encode_decision_payload(p: &DecisionPayload) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(192);
    w.put_u8(EVENT_TAG_DECISION);
    w.put_string(&p.tenant_id);
    w.put_string(&p.decision_id);
    w.put_raw(p.request_digest.0.as_bytes());
    w.put_u8(p.verdict.tag());
    w.put_raw(p.reason_trace_digest.as_bytes());
    w.put_raw(p.policy_version_hash.0.as_bytes());
    w.put_opt(p.token_id.as_ref(), |w, t| w.put_raw(t.as_bytes()));
    w.put_i64_be(p.issued_at);
    w.put_opt(p.expires_at.as_ref(), |w, e| w.put_i64_be(*e));
    w.into_bytes()
}

pub fn decode_decision_payload(bytes: &[u8]) -> Result<DecisionPayload, CodecError> {
    let mut r = CanonicalReader::new(bytes);
    let tag = r.take_u8()?;
    if tag != EVENT_TAG_DECISION {
        return Err(CodecError::UnknownTag {
            what: "decision payload event",
            tag,
        });
    }
    let tenant_id = r.take_string()?;
    let decision_id = r.take_string()?;
    let request_digest = RequestDigest(Hash256::from_bytes(r.take_array::<32>()?));
    let verdict_tag = r.take_u8()?;
    let verdict = Verdict::from_tag(verdict_tag).ok_or(CodecError::UnknownTag {
        what: "verdict",
        tag: verdict_tag,
    })?;
    let reason_trace_digest = Hash256::from_bytes(r.take_array::<32>()?);
    let policy_version_hash = PolicyVersionHash(Hash256::from_bytes(r.take_array::<32>()?));
    let token_id = r.take_opt(|r| {
        Ok(warden_core::types::TokenId(r.take_array::<16>()?))
    })?;
    let issued_at = r.take_i64_be()?;
    let expires_at = r.take_opt(|r| r.take_i64_be())?;
    r.finish()?;

    Ok(DecisionPayload {
        tenant_id,
        decision_id,
        request_digest,
        verdict,
        reason_trace_digest,
        policy_version_hash,
        token_id,
        issued_at,
        expires_at,
    })
}

// ── Policy-loaded payload ────────────────────────────────────────────────────

pub fn encode_policy_loaded_payload(p: &PolicyLoadedPayload) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(96);
    w.put_u8(EVENT_TAG_POLICY_LOADED);
    w.put_string(&p.policy_id);
    w.put_raw(p.version_hash.0.as_bytes());
    w.put_opt(p.previous_version_hash.as_ref(), |w, h| {
        w.put_raw(h.0.as_bytes())
    });
    w.into_bytes()
}

pub fn decode_policy_loaded_payload(bytes: &[u8]) -> Result<PolicyLoadedPayload, CodecError> {
    let mut r = CanonicalReader::new(bytes);
    let tag = r.take_u8()?;
    if tag != EVENT_TAG_POLICY_LOADED {
        return Err(CodecError::UnknownTag {
            what: "policy_loaded payload event",
            tag,
        });
    }
    let policy_id = r.take_string()?;
    let version_hash = PolicyVersionHash(Hash256::from_bytes(r.take_array::<32>()?));
    let previous_version_hash =
        r.take_opt(|r| Ok(PolicyVersionHash(Hash256::from_bytes(r.take_array::<32>()?))))?;
    r.finish()?;

    Ok(PolicyLoadedPayload {
        policy_id,
        version_hash,
        previous_version_hash,
    })
}

// ── Approval claim ───────────────────────────────────────────────────────────

/// Canonical bytes an approver signs to vouch for (tenant, actor, action)
/// under a role. Consumed by the `approval_present` condition.
pub fn encode_approval_claim(
    tenant_id: &str,
    actor_id: &str,
    action_id: &str,
    approver_role: &str,
) -> Vec<u8> {
    let mut w = CanonicalWriter::with_capacity(96);
    w.put_string(tenant_id);
    w.put_string(actor_id);
    w.put_string(action_id);
    w.put_string(approver_role);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use warden_core::types::TokenId;
    use warden_core::ReasonRole;

    fn sample_request() -> DecisionRequest {
        let mut context = BTreeMap::new();
        context.insert("region".to_string(), ContextValue::Str("eu".into()));
        context.insert("attempt".to_string(), ContextValue::Int(3));
        context.insert("dry_run".to_string(), ContextValue::Bool(false));
        DecisionRequest {
            request_id: "req-1".into(),
            tenant_id: "acme".into(),
            actor_id: "model".into(),
            action_id: "search_web".into(),
            resource_id: None,
            data_class: Some("public_data".into()),
            context,
            risk_level: Some(2),
            wall_clock_us: 1_700_000_000_000_000,
        }
    }

    #[test]
    fn request_encoding_is_stable() {
        let a = encode_request(&sample_request());
        let b = encode_request(&sample_request());
        assert_eq!(a, b);
    }

    #[test]
    fn request_encoding_depends_on_every_field() {
        let base = encode_request(&sample_request());

        let mut changed = sample_request();
        changed.risk_level = None;
        assert_ne!(base, encode_request(&changed));

        let mut changed = sample_request();
        changed.wall_clock_us += 1;
        assert_ne!(base, encode_request(&changed));

        let mut changed = sample_request();
        changed
            .context
            .insert("attempt".to_string(), ContextValue::Int(4));
        assert_ne!(base, encode_request(&changed));
    }

    #[test]
    fn context_keys_are_byte_sorted() {
        let mut req = sample_request();
        req.context.clear();
        req.context.insert("b".into(), ContextValue::Int(1));
        req.context.insert("a".into(), ContextValue::Int(2));
        let bytes = encode_request(&req);

        // "a" must appear before "b" in the stream regardless of insertion.
        let pos_a = bytes.windows(5).position(|w| w == [0, 0, 0, 1, b'a']);
        let pos_b = bytes.windows(5).position(|w| w == [0, 0, 0, 1, b'b']);
        assert!(pos_a.unwrap() < pos_b.unwrap());
    }

    #[test]
    fn entry_body_round_trip() {
        let bytes = encode_entry_body(7, 1_700_000_000_000_000, 1, "acme", b"payload");
        let body = decode_entry_body(&bytes).unwrap();
        assert_eq!(body.seq, 7);
        assert_eq!(body.event_tag, 1);
        assert_eq!(body.tenant_id, "acme");
        assert_eq!(body.payload, b"payload");
    }

    #[test]
    fn entry_body_rejects_truncation_and_trailing() {
        let bytes = encode_entry_body(1, 0, 1, "t", b"p");
        assert!(decode_entry_body(&bytes[..bytes.len() - 1]).is_err());
        let mut extended = bytes.clone();
        extended.push(0);
        assert!(matches!(
            decode_entry_body(&extended),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn decision_payload_round_trip() {
        let p = DecisionPayload {
            tenant_id: "acme".into(),
            decision_id: "d-1".into(),
            request_digest: RequestDigest(Hash256::from_bytes([1u8; 32])),
            verdict: Verdict::Allow,
            reason_trace_digest: Hash256::from_bytes([2u8; 32]),
            policy_version_hash: PolicyVersionHash(Hash256::from_bytes([3u8; 32])),
            token_id: Some(TokenId([4u8; 16])),
            issued_at: 10,
            expires_at: Some(20),
        };
        let decoded = decode_decision_payload(&encode_decision_payload(&p)).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn policy_loaded_payload_round_trip() {
        let p = PolicyLoadedPayload {
            policy_id: "base".into(),
            version_hash: PolicyVersionHash(Hash256::from_bytes([5u8; 32])),
            previous_version_hash: None,
        };
        let decoded = decode_policy_loaded_payload(&encode_policy_loaded_payload(&p)).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn token_wire_round_trip() {
        let token = CapabilityToken {
            token_id: TokenId([0u8; 16]),
            request_digest: RequestDigest(Hash256::from_bytes([7u8; 32])),
            actor_id: "model".into(),
            action_id: "search_web".into(),
            data_class: None,
            issued_at: 100,
            expires_at: 200,
            policy_version_hash: PolicyVersionHash(Hash256::from_bytes([8u8; 32])),
            signature: Ed25519Signature(vec![9u8; 64]),
        };
        let wire = encode_token_wire(&token);
        let decoded = decode_token_wire(&wire).unwrap();
        assert_eq!(decoded.actor_id, "model");
        assert_eq!(decoded.expires_at, 200);
        assert_eq!(decoded.signature, token.signature);
        assert_eq!(decoded.body, encode_token_body(&token));
    }

    proptest::proptest! {
        /// Any well-formed entry body survives a decode round trip, and the
        /// reader consumes exactly the bytes the writer produced.
        #[test]
        fn entry_body_round_trips(
            seq in 1u64..u64::MAX / 2,
            ts in proptest::num::i64::ANY,
            tag in 1u8..=2,
            tenant in "[a-z0-9:/._-]{1,24}",
            payload in proptest::collection::vec(proptest::num::u8::ANY, 0..256),
        ) {
            let bytes = encode_entry_body(seq, ts, tag, &tenant, &payload);
            let body = decode_entry_body(&bytes).unwrap();
            proptest::prop_assert_eq!(body.seq, seq);
            proptest::prop_assert_eq!(body.timestamp_us, ts);
            proptest::prop_assert_eq!(body.event_tag, tag);
            proptest::prop_assert_eq!(body.tenant_id, tenant);
            proptest::prop_assert_eq!(body.payload, payload);
        }
    }

    #[test]
    fn reason_trace_digest_input_reflects_order() {
        let a = vec![
            ReasonStep::new("r1", ReasonRole::Permit),
            ReasonStep::new("r2", ReasonRole::Forbid),
        ];
        let mut b = a.clone();
        b.swap(0, 1);
        assert_ne!(encode_reason_trace(&a), encode_reason_trace(&b));
    }
}
