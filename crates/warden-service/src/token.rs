use warden_codec::{decode_token_wire, encode_token_body_fields};
use warden_core::request::DecisionRequest;
use warden_core::token::{CapabilityToken, TokenVerification};
use warden_core::types::{RequestDigest, TimestampUs};
use warden_core::MICROS_PER_SEC;
use warden_crypto::{token_id_from_body, verify_signature, KeyRing, NodeSigner};
use warden_policy::Policy;

/// Mint a capability token for an allowed request.
///
/// `expires_at = issued_at + min(requested_ttl, policy.default_token_ttl)`;
/// the body is canonical-encoded, the token id is derived from its digest,
/// and the signature covers exactly the body bytes.
pub fn mint_token(
    signer: &NodeSigner,
    policy: &Policy,
    req: &DecisionRequest,
    request_digest: RequestDigest,
    issued_at: TimestampUs,
    requested_ttl_secs: Option<u32>,
) -> CapabilityToken {
    let ttl_secs = requested_ttl_secs
        .unwrap_or(policy.default_token_ttl_secs)
        .min(policy.default_token_ttl_secs);
    let expires_at = issued_at + ttl_secs as i64 * MICROS_PER_SEC;

    let body = encode_token_body_fields(
        &request_digest,
        &req.actor_id,
        &req.action_id,
        req.data_class.as_deref(),
        issued_at,
        expires_at,
        &policy.version_hash,
    );
    let token_id = token_id_from_body(&body);
    let signature = signer.sign(&body);

    CapabilityToken {
        token_id,
        request_digest,
        actor_id: req.actor_id.clone(),
        action_id: req.action_id.clone(),
        data_class: req.data_class.clone(),
        issued_at,
        expires_at,
        policy_version_hash: policy.version_hash,
        signature,
    }
}

/// Verify a token wire form presented by a downstream runtime.
///
/// Checks, in order: decodability, signature under the key valid at
/// `issued_at`, then expiry against `now_us`. The bound policy version hash
/// is reported whenever the wire form decodes, valid or not.
pub fn verify_token_wire(keyring: &KeyRing, wire: &[u8], now_us: TimestampUs) -> TokenVerification {
    let decoded = match decode_token_wire(wire) {
        Ok(decoded) => decoded,
        Err(_) => return TokenVerification::invalid("decode_error", None),
    };
    let bound = decoded.policy_version_hash;

    let Some(key) = keyring.key_valid_at(decoded.issued_at) else {
        return TokenVerification::invalid("unknown_signer", Some(bound));
    };
    if !verify_signature(key, &decoded.body, &decoded.signature) {
        return TokenVerification::invalid("signature_invalid", Some(bound));
    }
    if now_us >= decoded.expires_at {
        return TokenVerification::invalid("expired", Some(bound));
    }

    TokenVerification::valid(bound)
}
