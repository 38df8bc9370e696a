use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use warden_codec::{encode_decision_payload, encode_policy_loaded_payload, encode_reason_trace,
    encode_request};
use warden_core::decision::{DecisionResponse, Verdict};
use warden_core::entry::{AppendReceipt, DecisionPayload, EventType, PolicyLoadedPayload};
use warden_core::error::WardenError;
use warden_core::request::Principal;
use warden_core::token::TokenVerification;
use warden_core::types::PolicyVersionHash;
use warden_core::SYSTEM_TENANT;
use warden_crypto::{request_digest, sha256, NodeSigner};
use warden_engine::{standard_rate_keys, PolicyEngine};
use warden_ledger::Ledger;
use warden_policy::{load_document, ActivePolicy, LoadWarning, Policy, PolicyDocument};

use crate::counters::MemoryCounters;
use crate::idempotency::{IdempotencyCache, Replay};
use crate::token::{mint_token, verify_token_wire};
use crate::validate::{validate, DecideInput};

/// The sole entry point of the core: validated request → decision → optional
/// token → durable ledger entry → response.
///
/// Concurrent `decide` calls share only the ActivePolicy pointer, the
/// per-tenant append locks inside the ledger, and the idempotency cache;
/// within one call the steps are strictly sequential.
pub struct DecisionService {
    active: Arc<ActivePolicy>,
    engine: PolicyEngine,
    signer: Arc<NodeSigner>,
    ledger: Arc<Ledger>,
    counters: Option<Arc<MemoryCounters>>,
    idempotency: IdempotencyCache,
}

impl DecisionService {
    pub fn new(
        active: Arc<ActivePolicy>,
        engine: PolicyEngine,
        signer: Arc<NodeSigner>,
        ledger: Arc<Ledger>,
        idempotency_retention_secs: i64,
    ) -> Self {
        Self {
            active,
            engine,
            signer,
            ledger,
            counters: None,
            idempotency: IdempotencyCache::new(idempotency_retention_secs),
        }
    }

    /// Wire in the default sidecar counters; each decision then records the
    /// standard per-actor / per-action / per-tenant keys.
    pub fn with_counters(mut self, counters: Arc<MemoryCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn active_policy(&self) -> Arc<Policy> {
        self.active.capture()
    }

    pub fn signer_public_key(&self) -> warden_core::types::Ed25519PublicKey {
        self.signer.public_key()
    }

    // ── Decide ───────────────────────────────────────────────────────────────

    /// Run one decision end to end. The ledger entry is durable before this
    /// returns; on any error past evaluation neither the entry nor the
    /// response becomes visible.
    pub fn decide(
        &self,
        input: &DecideInput,
        principal: &Principal,
        deadline: Option<Instant>,
    ) -> Result<DecisionResponse, WardenError> {
        // Capture the moment once; every downstream step sees this clock.
        let now_us = chrono::Utc::now().timestamp_micros();

        let request = validate(input, principal, now_us)?;

        // Replay detection must compare digests computed over the same wall
        // clock the original carried, otherwise every retry would differ.
        if input.request_id.is_some() {
            if let Some(original_wall_clock) =
                self.idempotency
                    .wall_clock_for(&request.tenant_id, &request.request_id, now_us)
            {
                let mut probe = request.clone();
                probe.wall_clock_us = original_wall_clock;
                let candidate = request_digest(&encode_request(&probe));
                match self.idempotency.lookup(
                    &request.tenant_id,
                    &request.request_id,
                    &candidate,
                    now_us,
                ) {
                    Replay::Hit(response, _) => {
                        debug!(request_id = %request.request_id, "idempotent replay");
                        return Ok(*response);
                    }
                    Replay::DigestMismatch => {
                        return Err(WardenError::IdempotencyDigestMismatch)
                    }
                    Replay::Miss => {}
                }
            }
        }

        check_deadline(deadline)?;

        // Pin the policy: later swaps cannot affect this decision.
        let policy = self.active.capture();

        let outcome = self.engine.evaluate(&policy, &request);

        check_deadline(deadline)?;

        let digest = request_digest(&encode_request(&request));

        let token = (outcome.verdict == Verdict::Allow).then(|| {
            mint_token(
                &self.signer,
                &policy,
                &request,
                digest,
                now_us,
                input.requested_ttl_secs,
            )
        });

        let decision_id = uuid::Uuid::new_v4().to_string();
        let payload = DecisionPayload {
            tenant_id: request.tenant_id.clone(),
            decision_id: decision_id.clone(),
            request_digest: digest,
            verdict: outcome.verdict,
            reason_trace_digest: sha256(&encode_reason_trace(&outcome.reason_trace)),
            policy_version_hash: policy.version_hash,
            token_id: token.as_ref().map(|t| t.token_id),
            issued_at: now_us,
            expires_at: token.as_ref().map(|t| t.expires_at),
        };
        let payload_bytes = encode_decision_payload(&payload);

        // Last cancellation point: once the append begins it completes, and
        // a deadline that fires during it does not suppress the response.
        check_deadline(deadline)?;

        let receipt = self.ledger.append(
            &request.tenant_id,
            EventType::Decision,
            payload_bytes,
            now_us,
        )?;

        if let Some(counters) = &self.counters {
            for key in standard_rate_keys(&request.tenant_id, &request.actor_id, &request.action_id)
            {
                counters.record(&key, now_us);
            }
        }

        let response = DecisionResponse {
            decision_id,
            verdict: outcome.verdict,
            reason_trace: outcome.reason_trace,
            token,
            seq: receipt.seq,
            entry_hash: receipt.entry_hash,
            entry_signature: receipt.signature,
            policy_version_hash: policy.version_hash,
            issued_at: now_us,
            expires_at: payload.expires_at,
        };

        // Only caller-supplied ids can ever be replayed.
        if input.request_id.is_some() {
            self.idempotency.store(
                &request.tenant_id,
                &request.request_id,
                digest,
                request.wall_clock_us,
                response.clone(),
                now_us,
            );
        }

        info!(
            tenant = %request.tenant_id,
            actor = %request.actor_id,
            action = %request.action_id,
            verdict = %response.verdict,
            seq = response.seq,
            "decision recorded"
        );
        Ok(response)
    }

    // ── Token verification ───────────────────────────────────────────────────

    /// Verify a presented capability token wire form against the published
    /// key set and the current clock.
    pub fn verify_token(&self, wire: &[u8]) -> TokenVerification {
        let now_us = chrono::Utc::now().timestamp_micros();
        verify_token_wire(self.ledger.keyring(), wire, now_us)
    }

    // ── Policy publication ───────────────────────────────────────────────────

    /// Load, validate, record, and atomically publish a policy document.
    /// On any failure the previously published policy stays in effect.
    pub fn install_policy(
        &self,
        doc: PolicyDocument,
    ) -> Result<(Arc<Policy>, Vec<LoadWarning>), WardenError> {
        let loaded = load_document(doc)?;
        let previous = self.active.capture();

        self.record_policy_loaded(&loaded.policy, Some(previous.version_hash))?;
        self.active.swap(Arc::clone(&loaded.policy));

        info!(
            policy_id = %loaded.policy.policy_id,
            version = %loaded.policy.version_string,
            hash = %loaded.policy.version_hash,
            "policy published"
        );
        Ok((loaded.policy, loaded.warnings))
    }

    /// Append the `policy_loaded` control event for a policy that is already
    /// published (startup bootstrap passes `previous = None`).
    pub fn record_policy_loaded(
        &self,
        policy: &Policy,
        previous: Option<PolicyVersionHash>,
    ) -> Result<AppendReceipt, WardenError> {
        let payload = PolicyLoadedPayload {
            policy_id: policy.policy_id.clone(),
            version_hash: policy.version_hash,
            previous_version_hash: previous,
        };
        let now_us = chrono::Utc::now().timestamp_micros();
        self.ledger.append(
            SYSTEM_TENANT,
            EventType::PolicyLoaded,
            encode_policy_loaded_payload(&payload),
            now_us,
        )
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), WardenError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(WardenError::DeadlineExceeded),
        _ => Ok(()),
    }
}
