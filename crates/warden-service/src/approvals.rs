use std::collections::HashMap;

use warden_codec::encode_approval_claim;
use warden_core::types::{Ed25519PublicKey, Ed25519Signature};
use warden_crypto::verify_signature;
use warden_engine::ApprovalVerifier;

/// Role-keyed registry of approver verification keys.
///
/// An approval token is the hex of an Ed25519 signature over the canonical
/// approval claim (tenant, actor, action, role); any registered key for the
/// role may have produced it. Signature checking is the signer's primitive —
/// the engine never touches key material.
#[derive(Default)]
pub struct RoleApprovals {
    keys_by_role: HashMap<String, Vec<Ed25519PublicKey>>,
}

impl RoleApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_approver(&mut self, role: impl Into<String>, key: Ed25519PublicKey) {
        self.keys_by_role.entry(role.into()).or_default().push(key);
    }
}

impl ApprovalVerifier for RoleApprovals {
    fn approval_valid(
        &self,
        tenant_id: &str,
        actor_id: &str,
        action_id: &str,
        approver_role: &str,
        token_hex: &str,
    ) -> bool {
        let Some(keys) = self.keys_by_role.get(approver_role) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(token_hex) else {
            return false;
        };
        let signature = Ed25519Signature(sig_bytes);
        let claim = encode_approval_claim(tenant_id, actor_id, action_id, approver_role);
        keys.iter()
            .any(|key| verify_signature(key, &claim, &signature))
    }
}

/// Produce the approval token an approver hands to a caller. Lives next to
/// the verifier so the claim layout cannot drift between the two.
pub fn issue_approval(
    signer: &warden_crypto::NodeSigner,
    tenant_id: &str,
    actor_id: &str,
    action_id: &str,
    approver_role: &str,
) -> String {
    let claim = encode_approval_claim(tenant_id, actor_id, action_id, approver_role);
    hex::encode(signer.sign(&claim).0)
}
