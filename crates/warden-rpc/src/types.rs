use serde::{Deserialize, Serialize};

// ── Decide ───────────────────────────────────────────────────────────────────

/// Parameters of `warden_decide`. Unknown fields are rejected at this layer,
/// which is the wire boundary's "no unknown fields" rule.
///
/// `tenant_id` and `subject` stand in for the Principal the enclosing
/// deployment injects; the core trusts them.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcDecideParams {
    pub tenant_id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub actor_id: String,
    pub action_id: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub data_class: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub risk_level: Option<u8>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub ttl_secs: Option<u32>,
    /// Relative deadline for this call, milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcReasonStep {
    pub rule_id: String,
    pub role: String,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcToken {
    pub token_id: String,
    /// Hex of canonical body ‖ signature — what downstream runtimes present.
    pub wire_hex: String,
    pub issued_at_us: i64,
    pub expires_at_us: i64,
    pub policy_version_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcDecisionResponse {
    pub decision_id: String,
    pub verdict: String,
    pub reason_trace: Vec<RpcReasonStep>,
    pub token: Option<RpcToken>,
    pub seq: u64,
    pub entry_hash: String,
    pub entry_signature: String,
    pub policy_version_hash: String,
    pub issued_at_us: i64,
    pub expires_at_us: Option<i64>,
}

// ── Token verification ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcTokenVerification {
    pub valid: bool,
    pub reason: Option<String>,
    pub bound_policy_version_hash: Option<String>,
}

// ── Ledger queries ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcLedgerRangeParams {
    pub tenant_id: String,
    pub from_seq: u64,
    pub to_seq: u64,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcLedgerEntry {
    pub seq: u64,
    pub timestamp_us: i64,
    pub event_type: String,
    pub tenant_id: String,
    pub payload_hex: String,
    pub previous_hash: String,
    pub entry_hash: String,
    pub signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcLedgerTail {
    pub tenant_id: String,
    pub seq: u64,
    pub entry_hash: String,
    pub timestamp_us: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVerifyFailure {
    pub seq: u64,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVerifyReport {
    pub ok: bool,
    pub failures: Vec<RpcVerifyFailure>,
    pub entries_checked: u64,
}

// ── Operator info ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcPolicyInfo {
    pub policy_id: String,
    pub version_string: String,
    pub version_hash: String,
    pub mode: String,
    pub action_count: usize,
    pub actor_count: usize,
    pub data_class_count: usize,
    pub rule_count: usize,
    pub default_token_ttl_secs: u32,
    pub escalation_threshold: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcLoadReport {
    pub policy: RpcPolicyInfo,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSignerInfo {
    pub public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVersionInfo {
    pub node_version: String,
    pub api_version: String,
}
