/// Sidecar counter consulted by `rate_limit` conditions. The engine never
/// counts; the observed value is an input to the decision, which keeps
/// evaluation deterministic per call.
pub trait RateLimitObserver: Send + Sync {
    fn observe(&self, key: &str) -> u64;
}

/// Verifies approval tokens carried in a request's context. Implementations
/// delegate signature checking to the signer; the engine itself stays free of
/// key material.
pub trait ApprovalVerifier: Send + Sync {
    fn approval_valid(
        &self,
        tenant_id: &str,
        actor_id: &str,
        action_id: &str,
        approver_role: &str,
        token_hex: &str,
    ) -> bool;
}

/// The counter keys the default sidecar maintains for every decision, in
/// the same shape `rate_limit` selectors resolve to: `tenant:selector:value`.
/// `context:` selectors are fed by external counters only.
pub fn standard_rate_keys(tenant_id: &str, actor_id: &str, action_id: &str) -> [String; 3] {
    [
        format!("{tenant_id}:actor:{actor_id}"),
        format!("{tenant_id}:action:{action_id}"),
        format!("{tenant_id}:tenant:"),
    ]
}

/// Observer that has seen nothing. Useful default and test double.
pub struct ZeroCounts;

impl RateLimitObserver for ZeroCounts {
    fn observe(&self, _key: &str) -> u64 {
        0
    }
}

/// Verifier that accepts no approvals. Fail-closed default.
pub struct NoApprovals;

impl ApprovalVerifier for NoApprovals {
    fn approval_valid(&self, _: &str, _: &str, _: &str, _: &str, _: &str) -> bool {
        false
    }
}
