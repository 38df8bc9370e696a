use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::{info, warn};

use warden_codec::{decode_entry_body, encode_entry_body};
use warden_core::entry::{AppendReceipt, EventType, LedgerEntry, LedgerTail};
use warden_core::error::WardenError;
use warden_core::types::{Hash256, Seq, TimestampUs};
use warden_crypto::{chain_hash, KeyRing, NodeSigner};

use crate::store::LedgerDb;

// ── Per-tenant append serialization ──────────────────────────────────────────

/// One append at a time per tenant. `waiters` counts callers queued behind
/// the holder; beyond the configured bound new appends are rejected instead
/// of queueing, protecting the chain from unbounded buffering.
pub(crate) struct TenantLock {
    mutex: Mutex<()>,
    waiters: AtomicUsize,
}

impl TenantLock {
    pub(crate) fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            waiters: AtomicUsize::new(0),
        }
    }

    pub(crate) fn acquire(
        &self,
        max_waiters: usize,
        tenant: &str,
    ) -> Result<MutexGuard<'_, ()>, WardenError> {
        match self.mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }

        let queued = self.waiters.fetch_add(1, Ordering::SeqCst);
        if queued >= max_waiters {
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            return Err(WardenError::AppendBackpressure {
                tenant: tenant.to_string(),
                waiters: queued,
            });
        }
        let guard = self.mutex.lock().unwrap_or_else(|p| p.into_inner());
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        Ok(guard)
    }
}

// ── Ledger ───────────────────────────────────────────────────────────────────

/// The tamper-evident decision log: per-tenant hash chains with signed,
/// serialized appends and lock-free reads.
pub struct Ledger {
    db: Arc<LedgerDb>,
    signer: Arc<NodeSigner>,
    keyring: Arc<KeyRing>,
    locks: Mutex<HashMap<String, Arc<TenantLock>>>,
    max_waiters: usize,
}

impl Ledger {
    pub fn new(
        db: Arc<LedgerDb>,
        signer: Arc<NodeSigner>,
        keyring: Arc<KeyRing>,
        max_waiters: usize,
    ) -> Self {
        Self {
            db,
            signer,
            keyring,
            locks: Mutex::new(HashMap::new()),
            max_waiters,
        }
    }

    pub fn db(&self) -> &LedgerDb {
        &self.db
    }

    pub fn keyring(&self) -> &KeyRing {
        &self.keyring
    }

    fn tenant_lock(&self, tenant: &str) -> Arc<TenantLock> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(
            locks
                .entry(tenant.to_string())
                .or_insert_with(|| Arc::new(TenantLock::new())),
        )
    }

    /// Append one event to a tenant's chain.
    ///
    /// The caller timestamp is clamped monotonic against the tail
    /// (`timestamp = max(caller, tail)`); the receipt carries the recorded
    /// value. The returned receipt means the entry is durable: entry persist
    /// and tail advance commit together before this returns, and a failure
    /// leaves the chain exactly as it was.
    pub fn append(
        &self,
        tenant: &str,
        event_type: EventType,
        payload: Vec<u8>,
        caller_timestamp_us: TimestampUs,
    ) -> Result<AppendReceipt, WardenError> {
        let lock = self.tenant_lock(tenant);
        let _guard = lock.acquire(self.max_waiters, tenant)?;

        let tail = self.db.get_tail(tenant)?;
        let (seq, previous_hash, timestamp_us) = match &tail {
            Some(t) => (
                t.seq + 1,
                t.entry_hash,
                caller_timestamp_us.max(t.timestamp_us),
            ),
            None => (1, Hash256::ZERO, caller_timestamp_us),
        };

        let body = encode_entry_body(seq, timestamp_us, event_type.tag(), tenant, &payload);

        // Encoding self-check: a body that does not decode back to its own
        // fields must never enter the chain.
        match decode_entry_body(&body) {
            Ok(decoded)
                if decoded.seq == seq
                    && decoded.timestamp_us == timestamp_us
                    && decoded.event_tag == event_type.tag()
                    && decoded.tenant_id == tenant
                    && decoded.payload == payload => {}
            _ => {
                warn!(%tenant, seq, "canonical self-check failed; append aborted");
                return Err(WardenError::Integrity(
                    "canonical entry body failed self-check".into(),
                ));
            }
        }

        let entry_hash = chain_hash(&previous_hash, &body);
        let signature = self.signer.sign(entry_hash.as_bytes());

        let entry = LedgerEntry {
            seq,
            timestamp_us,
            event_type,
            tenant_id: tenant.to_string(),
            payload,
            previous_hash,
            entry_hash,
            signature: signature.clone(),
        };

        self.db.commit_entry(&entry)?;

        info!(%tenant, seq, entry_hash = %entry_hash, event = event_type.as_str(), "ledger append");
        Ok(AppendReceipt {
            seq,
            entry_hash,
            signature,
            timestamp_us,
        })
    }

    // ── Reads (concurrent with at most one append) ───────────────────────────

    pub fn get_by_seq(&self, tenant: &str, seq: Seq) -> Result<Option<LedgerEntry>, WardenError> {
        self.db.get_entry(tenant, seq)
    }

    /// Entries in `[from_seq, to_seq]`, at most `limit`, ascending.
    pub fn range(
        &self,
        tenant: &str,
        from_seq: Seq,
        to_seq: Seq,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, WardenError> {
        let mut out = Vec::new();
        let from = from_seq.max(1);
        for seq in from..=to_seq {
            if out.len() >= limit {
                break;
            }
            match self.db.get_entry(tenant, seq)? {
                Some(entry) => out.push(entry),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn tail(&self, tenant: &str) -> Result<Option<LedgerTail>, WardenError> {
        self.db.get_tail(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ledger() -> Ledger {
        let db = Arc::new(LedgerDb::open_temporary().unwrap());
        let signer = Arc::new(NodeSigner::generate());
        let keyring = Arc::new(KeyRing::single(signer.public_key()));
        Ledger::new(db, signer, keyring, 4)
    }

    #[test]
    fn genesis_entry_chains_from_zero_hash() {
        let ledger = test_ledger();
        let receipt = ledger
            .append("acme", EventType::Decision, b"p1".to_vec(), 1_000)
            .unwrap();
        assert_eq!(receipt.seq, 1);

        let entry = ledger.get_by_seq("acme", 1).unwrap().unwrap();
        assert_eq!(entry.previous_hash, Hash256::ZERO);
        let body = encode_entry_body(1, 1_000, EventType::Decision.tag(), "acme", b"p1");
        assert_eq!(entry.entry_hash, chain_hash(&Hash256::ZERO, &body));
    }

    #[test]
    fn entries_link_and_seq_is_dense() {
        let ledger = test_ledger();
        for i in 0..5 {
            ledger
                .append("acme", EventType::Decision, vec![i], 1_000 + i as i64)
                .unwrap();
        }
        let tail = ledger.tail("acme").unwrap().unwrap();
        assert_eq!(tail.seq, 5);

        for seq in 2..=5 {
            let prev = ledger.get_by_seq("acme", seq - 1).unwrap().unwrap();
            let cur = ledger.get_by_seq("acme", seq).unwrap().unwrap();
            assert_eq!(cur.previous_hash, prev.entry_hash);
            assert_eq!(cur.seq, prev.seq + 1);
        }
    }

    #[test]
    fn signatures_verify_under_published_key() {
        let ledger = test_ledger();
        let receipt = ledger
            .append("acme", EventType::Decision, b"p".to_vec(), 1)
            .unwrap();
        let key = ledger.keyring().key_valid_at(1).unwrap();
        assert!(warden_crypto::verify_signature(
            key,
            receipt.entry_hash.as_bytes(),
            &receipt.signature
        ));
    }

    #[test]
    fn timestamps_clamp_monotonic_under_skew() {
        let ledger = test_ledger();
        ledger
            .append("acme", EventType::Decision, b"a".to_vec(), 5_000)
            .unwrap();
        // Clock went backwards; the chain must not.
        let receipt = ledger
            .append("acme", EventType::Decision, b"b".to_vec(), 3_000)
            .unwrap();
        assert_eq!(receipt.timestamp_us, 5_000);

        let e1 = ledger.get_by_seq("acme", 1).unwrap().unwrap();
        let e2 = ledger.get_by_seq("acme", 2).unwrap().unwrap();
        assert!(e2.timestamp_us >= e1.timestamp_us);
    }

    #[test]
    fn tenants_have_independent_chains() {
        let ledger = test_ledger();
        ledger
            .append("acme", EventType::Decision, b"a".to_vec(), 1)
            .unwrap();
        let receipt = ledger
            .append("globex", EventType::Decision, b"g".to_vec(), 1)
            .unwrap();
        assert_eq!(receipt.seq, 1);
        let entry = ledger.get_by_seq("globex", 1).unwrap().unwrap();
        assert_eq!(entry.previous_hash, Hash256::ZERO);
    }

    #[test]
    fn range_respects_bounds_and_limit() {
        let ledger = test_ledger();
        for i in 0..6u8 {
            ledger
                .append("acme", EventType::Decision, vec![i], i as i64)
                .unwrap();
        }
        let entries = ledger.range("acme", 2, 5, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 2);
        assert_eq!(entries[1].seq, 3);
    }

    proptest::proptest! {
        /// Whatever payloads and (possibly skewed) timestamps are appended,
        /// the resulting chain always verifies clean.
        #[test]
        fn any_append_sequence_verifies(
            payloads in proptest::collection::vec(
                proptest::collection::vec(proptest::num::u8::ANY, 0..64),
                1..12,
            ),
            timestamps in proptest::collection::vec(0i64..1_000_000, 1..12),
        ) {
            let ledger = test_ledger();
            let n = payloads.len().min(timestamps.len());
            for i in 0..n {
                // verify() decodes payloads, so wrap the random bytes in a
                // well-formed decision payload.
                let payload = warden_codec::encode_decision_payload(
                    &warden_core::entry::DecisionPayload {
                        tenant_id: "acme".into(),
                        decision_id: format!("d-{i}"),
                        request_digest: warden_core::types::RequestDigest(
                            Hash256::from_bytes([i as u8; 32]),
                        ),
                        verdict: warden_core::Verdict::Deny,
                        reason_trace_digest: warden_crypto::sha256(&payloads[i]),
                        policy_version_hash: warden_core::types::PolicyVersionHash(
                            Hash256::from_bytes([7; 32]),
                        ),
                        token_id: None,
                        issued_at: timestamps[i],
                        expires_at: None,
                    },
                );
                ledger
                    .append("acme", EventType::Decision, payload, timestamps[i])
                    .unwrap();
            }
            let report = ledger.verify("acme", 1, n as u64).unwrap();
            proptest::prop_assert!(report.ok, "failures: {:?}", report.failures);
        }
    }

    #[test]
    fn backpressure_rejects_queued_waiters_beyond_bound() {
        let lock = TenantLock::new();
        let guard = lock.acquire(0, "acme").unwrap();
        // The holder is not a waiter; the next caller would be waiter #0,
        // which already exceeds a bound of zero.
        let err = lock.acquire(0, "acme").unwrap_err();
        assert!(matches!(err, WardenError::AppendBackpressure { .. }));
        drop(guard);
        assert!(lock.acquire(0, "acme").is_ok());
    }
}
