use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcDecideParams, RpcDecisionResponse, RpcLedgerEntry, RpcLedgerRangeParams, RpcLedgerTail,
    RpcLoadReport, RpcPolicyInfo, RpcSignerInfo, RpcTokenVerification, RpcVerifyReport,
    RpcVersionInfo,
};

/// Warden JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "warden_" via `namespace = "warden"`.
#[rpc(server, namespace = "warden")]
pub trait WardenApi {
    /// Run one decision: validate, evaluate against the active policy, mint
    /// a capability token on allow, append to the tenant's ledger chain.
    #[method(name = "decide")]
    async fn decide(&self, params: RpcDecideParams) -> RpcResult<RpcDecisionResponse>;

    /// Verify a capability token wire form (hex). Returns validity, a
    /// machine-readable reason when invalid, and the bound policy version.
    #[method(name = "verifyToken")]
    async fn verify_token(&self, token_hex: String) -> RpcResult<RpcTokenVerification>;

    /// Get a single ledger entry by tenant and sequence number.
    #[method(name = "getLedgerEntry")]
    async fn get_ledger_entry(
        &self,
        tenant_id: String,
        seq: u64,
    ) -> RpcResult<Option<RpcLedgerEntry>>;

    /// Return entries in `[from_seq, to_seq]` (limit capped at 1000).
    #[method(name = "ledgerRange")]
    async fn ledger_range(&self, params: RpcLedgerRangeParams) -> RpcResult<Vec<RpcLedgerEntry>>;

    /// Recompute hashes and check signatures over a chain range. All
    /// failures are reported with their sequence numbers.
    #[method(name = "ledgerVerify")]
    async fn ledger_verify(
        &self,
        tenant_id: String,
        from_seq: u64,
        to_seq: u64,
    ) -> RpcResult<RpcVerifyReport>;

    /// The current tail of a tenant chain, if the chain exists.
    #[method(name = "ledgerTail")]
    async fn ledger_tail(&self, tenant_id: String) -> RpcResult<Option<RpcLedgerTail>>;

    /// Tails of every tenant chain this node stores.
    #[method(name = "getLedgerStats")]
    async fn get_ledger_stats(&self) -> RpcResult<Vec<RpcLedgerTail>>;

    /// The currently active policy version.
    #[method(name = "getPolicyInfo")]
    async fn get_policy_info(&self) -> RpcResult<RpcPolicyInfo>;

    /// Validate and atomically publish a policy document. Returns the new
    /// version plus any operator warnings.
    #[method(name = "loadPolicy")]
    async fn load_policy(&self, document: serde_json::Value) -> RpcResult<RpcLoadReport>;

    /// The published ledger-signing verification key.
    #[method(name = "getSignerInfo")]
    async fn get_signer_info(&self) -> RpcResult<RpcSignerInfo>;

    /// Node and API version information.
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<RpcVersionInfo>;
}
