use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use warden_core::entry::LedgerEntry;
use warden_core::error::{ErrorKind, WardenError};
use warden_core::request::Principal;
use warden_core::token::CapabilityToken;
use warden_policy::document::context_value_from_json;
use warden_policy::Policy;
use warden_service::{DecideInput, DecisionService};

use crate::api::WardenApiServer;
use crate::types::{
    RpcDecideParams, RpcDecisionResponse, RpcLedgerEntry, RpcLedgerRangeParams, RpcLedgerTail,
    RpcLoadReport, RpcPolicyInfo, RpcReasonStep, RpcSignerInfo, RpcToken, RpcTokenVerification,
    RpcVerifyFailure, RpcVerifyReport, RpcVersionInfo,
};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

/// Map a core error onto a JSON-RPC error with a stable kind-specific code.
fn warden_err(e: WardenError) -> ErrorObject<'static> {
    let code = match e.kind() {
        ErrorKind::InvalidRequest => -32602,
        ErrorKind::Conflict => -32001,
        ErrorKind::Unavailable => -32002,
        ErrorKind::Timeout => -32003,
        ErrorKind::Unauthorized => -32004,
        ErrorKind::Internal => -32603,
    };
    rpc_err(code, format!("{}: {e}", e.kind()))
}

/// The RPC server implementation over the decision service.
pub struct RpcServer {
    service: Arc<DecisionService>,
}

impl RpcServer {
    pub fn new(service: Arc<DecisionService>) -> Self {
        Self { service }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

// ── DTO conversions ──────────────────────────────────────────────────────────

fn role_str(role: warden_core::ReasonRole) -> &'static str {
    use warden_core::ReasonRole::*;
    match role {
        Forbid => "forbid",
        Permit => "permit",
        RequiredUnmet => "required_unmet",
        Default => "default",
        ImpliedBy => "implied_by",
        EscalationTrigger => "escalation_trigger",
        DegradedPolicy => "degraded_policy",
    }
}

fn token_to_rpc(token: &CapabilityToken) -> RpcToken {
    RpcToken {
        token_id: token.token_id.to_hex(),
        wire_hex: hex::encode(warden_codec::encode_token_wire(token)),
        issued_at_us: token.issued_at,
        expires_at_us: token.expires_at,
        policy_version_hash: token.policy_version_hash.to_hex(),
    }
}

fn entry_to_rpc(entry: LedgerEntry) -> RpcLedgerEntry {
    RpcLedgerEntry {
        seq: entry.seq,
        timestamp_us: entry.timestamp_us,
        event_type: entry.event_type.as_str().to_string(),
        tenant_id: entry.tenant_id,
        payload_hex: hex::encode(entry.payload),
        previous_hash: entry.previous_hash.to_hex(),
        entry_hash: entry.entry_hash.to_hex(),
        signature: entry.signature.to_hex(),
    }
}

fn policy_to_rpc(policy: &Policy) -> RpcPolicyInfo {
    RpcPolicyInfo {
        policy_id: policy.policy_id.clone(),
        version_string: policy.version_string.clone(),
        version_hash: policy.version_hash.to_hex(),
        mode: policy.mode.as_str().to_string(),
        action_count: policy.actions.len(),
        actor_count: policy.actors.len(),
        data_class_count: policy.data_classes.len(),
        rule_count: policy.permits.len()
            + policy.forbids.len()
            + policy.requires.len()
            + policy.implications.len(),
        default_token_ttl_secs: policy.default_token_ttl_secs,
        escalation_threshold: policy.escalation_threshold,
    }
}

fn decide_input_from_params(params: &RpcDecideParams) -> Result<DecideInput, ErrorObject<'static>> {
    let mut context = std::collections::BTreeMap::new();
    for (key, value) in &params.context {
        let Some(scalar) = context_value_from_json(value) else {
            return Err(rpc_err(
                -32602,
                format!("context field {key:?} is not a flat string/int/bool scalar"),
            ));
        };
        context.insert(key.clone(), scalar);
    }
    Ok(DecideInput {
        request_id: params.request_id.clone(),
        actor_id: params.actor_id.clone(),
        action_id: params.action_id.clone(),
        resource_id: params.resource_id.clone(),
        data_class: params.data_class.clone(),
        context,
        risk_level: params.risk_level,
        requested_ttl_secs: params.ttl_secs,
    })
}

// ── RPC implementation ────────────────────────────────────────────────────────

#[async_trait]
impl WardenApiServer for RpcServer {
    async fn decide(&self, params: RpcDecideParams) -> RpcResult<RpcDecisionResponse> {
        if params.tenant_id.is_empty() {
            return Err(warden_err(WardenError::MissingPrincipal).into());
        }
        let principal = Principal {
            tenant_id: params.tenant_id.clone(),
            subject: params.subject.clone().unwrap_or_else(|| "anonymous".into()),
            roles: vec![],
        };
        let input = decide_input_from_params(&params)?;
        let deadline = params
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        let response = self
            .service
            .decide(&input, &principal, deadline)
            .map_err(warden_err)?;

        Ok(RpcDecisionResponse {
            decision_id: response.decision_id,
            verdict: response.verdict.to_string(),
            reason_trace: response
                .reason_trace
                .iter()
                .map(|s| RpcReasonStep {
                    rule_id: s.rule_id.clone(),
                    role: role_str(s.role).to_string(),
                    detail: s.detail.clone(),
                })
                .collect(),
            token: response.token.as_ref().map(token_to_rpc),
            seq: response.seq,
            entry_hash: response.entry_hash.to_hex(),
            entry_signature: response.entry_signature.to_hex(),
            policy_version_hash: response.policy_version_hash.to_hex(),
            issued_at_us: response.issued_at,
            expires_at_us: response.expires_at,
        })
    }

    async fn verify_token(&self, token_hex: String) -> RpcResult<RpcTokenVerification> {
        let wire = match hex::decode(&token_hex) {
            Ok(wire) => wire,
            Err(_) => {
                return Ok(RpcTokenVerification {
                    valid: false,
                    reason: Some("decode_error".into()),
                    bound_policy_version_hash: None,
                })
            }
        };
        let verification = self.service.verify_token(&wire);
        Ok(RpcTokenVerification {
            valid: verification.valid,
            reason: verification.reason,
            bound_policy_version_hash: verification
                .bound_policy_version_hash
                .map(|h| h.to_hex()),
        })
    }

    async fn get_ledger_entry(
        &self,
        tenant_id: String,
        seq: u64,
    ) -> RpcResult<Option<RpcLedgerEntry>> {
        let entry = self
            .service
            .ledger()
            .get_by_seq(&tenant_id, seq)
            .map_err(warden_err)?;
        Ok(entry.map(entry_to_rpc))
    }

    async fn ledger_range(&self, params: RpcLedgerRangeParams) -> RpcResult<Vec<RpcLedgerEntry>> {
        let limit = params.limit.unwrap_or(200).min(1000) as usize;
        let entries = self
            .service
            .ledger()
            .range(&params.tenant_id, params.from_seq, params.to_seq, limit)
            .map_err(warden_err)?;
        Ok(entries.into_iter().map(entry_to_rpc).collect())
    }

    async fn ledger_verify(
        &self,
        tenant_id: String,
        from_seq: u64,
        to_seq: u64,
    ) -> RpcResult<RpcVerifyReport> {
        let report = self
            .service
            .ledger()
            .verify(&tenant_id, from_seq, to_seq)
            .map_err(warden_err)?;
        Ok(RpcVerifyReport {
            ok: report.ok,
            failures: report
                .failures
                .into_iter()
                .map(|f| RpcVerifyFailure {
                    seq: f.seq,
                    reason: f.reason.as_str().to_string(),
                })
                .collect(),
            entries_checked: report.entries_checked,
        })
    }

    async fn ledger_tail(&self, tenant_id: String) -> RpcResult<Option<RpcLedgerTail>> {
        let tail = self
            .service
            .ledger()
            .tail(&tenant_id)
            .map_err(warden_err)?;
        Ok(tail.map(|t| RpcLedgerTail {
            tenant_id,
            seq: t.seq,
            entry_hash: t.entry_hash.to_hex(),
            timestamp_us: t.timestamp_us,
        }))
    }

    async fn get_ledger_stats(&self) -> RpcResult<Vec<RpcLedgerTail>> {
        let tails = self.service.ledger().db().iter_tails().map_err(warden_err)?;
        Ok(tails
            .into_iter()
            .map(|(tenant_id, t)| RpcLedgerTail {
                tenant_id,
                seq: t.seq,
                entry_hash: t.entry_hash.to_hex(),
                timestamp_us: t.timestamp_us,
            })
            .collect())
    }

    async fn get_policy_info(&self) -> RpcResult<RpcPolicyInfo> {
        Ok(policy_to_rpc(&self.service.active_policy()))
    }

    async fn load_policy(&self, document: serde_json::Value) -> RpcResult<RpcLoadReport> {
        let doc: warden_policy::PolicyDocument = serde_json::from_value(document)
            .map_err(|e| rpc_err(-32602, format!("invalid policy document: {e}")))?;
        let (policy, warnings) = self.service.install_policy(doc).map_err(warden_err)?;
        Ok(RpcLoadReport {
            policy: policy_to_rpc(&policy),
            warnings: warnings.into_iter().map(|w| w.message).collect(),
        })
    }

    async fn get_signer_info(&self) -> RpcResult<RpcSignerInfo> {
        Ok(RpcSignerInfo {
            public_key: self.service.signer_public_key().to_hex(),
        })
    }

    async fn get_version(&self) -> RpcResult<RpcVersionInfo> {
        Ok(RpcVersionInfo {
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: "1".to_string(),
        })
    }
}
