use warden_codec::{decode_decision_payload, decode_policy_loaded_payload, encode_entry_body};
use warden_core::entry::{EventType, VerifyFailure, VerifyFailureReason, VerifyReport};
use warden_core::error::WardenError;
use warden_core::types::{Hash256, Seq, TimestampUs};
use warden_crypto::chain_hash;

use crate::ledger::Ledger;

impl Ledger {
    /// Scan `[from_seq, to_seq]` of a tenant chain, recomputing every entry
    /// hash and checking every signature against the key valid at the
    /// entry's timestamp.
    ///
    /// All failures are reported; a bad entry never stops the scan. The
    /// running previous-hash is the *recomputed* one, so a tampered entry
    /// also fails its successors — both defenses (hash chain and per-entry
    /// signature) are checked, as they guard different adversaries.
    pub fn verify(
        &self,
        tenant: &str,
        from_seq: Seq,
        to_seq: Seq,
    ) -> Result<VerifyReport, WardenError> {
        let mut failures: Vec<VerifyFailure> = Vec::new();
        let mut entries_checked = 0u64;

        let from = from_seq.max(1);

        // Baseline for a mid-chain scan: the stored hash of the predecessor.
        let mut running_prev: Option<Hash256> = if from == 1 {
            Some(Hash256::ZERO)
        } else {
            self.db().get_entry(tenant, from - 1)?.map(|e| e.entry_hash)
        };
        let mut prev_ts: Option<TimestampUs> = None;

        for seq in from..=to_seq {
            let entry = match self.db().get_entry(tenant, seq) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    failures.push(VerifyFailure {
                        seq,
                        reason: VerifyFailureReason::SeqGap,
                    });
                    running_prev = None;
                    prev_ts = None;
                    continue;
                }
                Err(WardenError::Serialization(_)) => {
                    failures.push(VerifyFailure {
                        seq,
                        reason: VerifyFailureReason::DecodeError,
                    });
                    running_prev = None;
                    prev_ts = None;
                    continue;
                }
                Err(other) => return Err(other),
            };
            entries_checked += 1;

            let mut fail = |reason| {
                failures.push(VerifyFailure { seq, reason });
            };

            if entry.seq != seq {
                fail(VerifyFailureReason::SeqGap);
            }

            if let Some(prev) = prev_ts {
                if entry.timestamp_us < prev {
                    fail(VerifyFailureReason::TimestampRegression);
                }
            }
            prev_ts = Some(entry.timestamp_us);

            // Payload must decode under its declared event type.
            let payload_ok = match entry.event_type {
                EventType::Decision => decode_decision_payload(&entry.payload).is_ok(),
                EventType::PolicyLoaded => decode_policy_loaded_payload(&entry.payload).is_ok(),
            };
            if !payload_ok {
                fail(VerifyFailureReason::DecodeError);
            }

            // Recompute the chain hash from the stored fields.
            let body = encode_entry_body(
                entry.seq,
                entry.timestamp_us,
                entry.event_type.tag(),
                &entry.tenant_id,
                &entry.payload,
            );
            let recomputed = match running_prev {
                Some(prev) => {
                    let recomputed = chain_hash(&prev, &body);
                    if entry.previous_hash != prev || recomputed != entry.entry_hash {
                        fail(VerifyFailureReason::HashMismatch);
                    }
                    recomputed
                }
                // After a gap the chain link is unverifiable; check the
                // entry against its own stored previous hash only.
                None => {
                    let recomputed = chain_hash(&entry.previous_hash, &body);
                    if recomputed != entry.entry_hash {
                        fail(VerifyFailureReason::HashMismatch);
                    }
                    recomputed
                }
            };
            running_prev = Some(recomputed);

            // Signature over the stored entry hash, under the key whose
            // validity interval covers the entry timestamp.
            match self.keyring().key_valid_at(entry.timestamp_us) {
                None => fail(VerifyFailureReason::UnknownSigner),
                Some(key) => {
                    if !warden_crypto::verify_signature(
                        key,
                        entry.entry_hash.as_bytes(),
                        &entry.signature,
                    ) {
                        fail(VerifyFailureReason::SignatureInvalid);
                    }
                }
            }
        }

        Ok(VerifyReport {
            ok: failures.is_empty(),
            failures,
            entries_checked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerDb;
    use std::sync::Arc;
    use warden_codec::encode_decision_payload;
    use warden_core::entry::DecisionPayload;
    use warden_core::types::{Ed25519Signature, PolicyVersionHash, RequestDigest};
    use warden_core::Verdict;
    use warden_crypto::{KeyRing, NodeSigner};

    fn decision_payload(n: u8) -> Vec<u8> {
        encode_decision_payload(&DecisionPayload {
            tenant_id: "acme".into(),
            decision_id: format!("d-{n}"),
            request_digest: RequestDigest(Hash256::from_bytes([n; 32])),
            verdict: Verdict::Deny,
            reason_trace_digest: Hash256::from_bytes([n; 32]),
            policy_version_hash: PolicyVersionHash(Hash256::from_bytes([9; 32])),
            token_id: None,
            issued_at: n as i64,
            expires_at: None,
        })
    }

    fn populated_ledger(n: u8) -> Ledger {
        let db = Arc::new(LedgerDb::open_temporary().unwrap());
        let signer = Arc::new(NodeSigner::generate());
        let keyring = Arc::new(KeyRing::single(signer.public_key()));
        let ledger = Ledger::new(db, signer, keyring, 4);
        for i in 1..=n {
            ledger
                .append(
                    "acme",
                    EventType::Decision,
                    decision_payload(i),
                    1_000 + i as i64,
                )
                .unwrap();
        }
        ledger
    }

    #[test]
    fn clean_chain_verifies() {
        let ledger = populated_ledger(5);
        let report = ledger.verify("acme", 1, 5).unwrap();
        assert!(report.ok, "unexpected failures: {:?}", report.failures);
        assert_eq!(report.entries_checked, 5);
    }

    #[test]
    fn tampered_payload_fails_entry_and_successor() {
        let ledger = populated_ledger(5);

        // Flip one byte of entry #3's payload in the storage layer.
        let mut entry = ledger.get_by_seq("acme", 3).unwrap().unwrap();
        let last = entry.payload.len() - 1;
        entry.payload[last] ^= 0xff;
        ledger.db().put_entry(&entry).unwrap();

        let report = ledger.verify("acme", 1, 5).unwrap();
        assert!(!report.ok);
        let failed: Vec<_> = report
            .failures
            .iter()
            .filter(|f| f.reason == VerifyFailureReason::HashMismatch)
            .map(|f| f.seq)
            .collect();
        assert!(failed.contains(&3), "seq 3 must fail: {:?}", report.failures);
        assert!(failed.contains(&4), "seq 4 must fail: {:?}", report.failures);
    }

    #[test]
    fn foreign_signature_is_reported_but_scan_continues() {
        let ledger = populated_ledger(3);

        let rogue = NodeSigner::generate();
        let mut entry = ledger.get_by_seq("acme", 2).unwrap().unwrap();
        entry.signature = rogue.sign(entry.entry_hash.as_bytes());
        ledger.db().put_entry(&entry).unwrap();

        let report = ledger.verify("acme", 1, 3).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].seq, 2);
        assert_eq!(
            report.failures[0].reason,
            VerifyFailureReason::SignatureInvalid
        );
        assert_eq!(report.entries_checked, 3);
    }

    #[test]
    fn undecodable_payload_reports_decode_error_with_seq() {
        let ledger = populated_ledger(3);

        let mut entry = ledger.get_by_seq("acme", 2).unwrap().unwrap();
        entry.payload = vec![0xff, 0x00];
        ledger.db().put_entry(&entry).unwrap();

        let report = ledger.verify("acme", 1, 3).unwrap();
        assert!(report
            .failures
            .iter()
            .any(|f| f.seq == 2 && f.reason == VerifyFailureReason::DecodeError));
    }

    #[test]
    fn missing_entry_reports_seq_gap() {
        let ledger = populated_ledger(3);
        let report = ledger.verify("acme", 1, 5).unwrap();
        assert!(report
            .failures
            .iter()
            .any(|f| f.seq == 4 && f.reason == VerifyFailureReason::SeqGap));
    }

    #[test]
    fn rotated_key_selected_by_entry_timestamp() {
        let db = Arc::new(LedgerDb::open_temporary().unwrap());
        let old_signer = Arc::new(NodeSigner::generate());
        let new_signer = Arc::new(NodeSigner::generate());

        let mut ring = KeyRing::new();
        ring.insert(old_signer.public_key(), 0);
        ring.insert(new_signer.public_key(), 10_000);

        // Entries before the rotation were signed by the old key.
        let ledger = Ledger::new(Arc::clone(&db), old_signer, Arc::new(ring.clone()), 4);
        ledger
            .append("acme", EventType::Decision, decision_payload(1), 5_000)
            .unwrap();

        // After rotation the new key signs; same ring verifies both.
        let ledger = Ledger::new(db, new_signer, Arc::new(ring), 4);
        ledger
            .append("acme", EventType::Decision, decision_payload(2), 20_000)
            .unwrap();

        let report = ledger.verify("acme", 1, 2).unwrap();
        assert!(report.ok, "failures: {:?}", report.failures);
    }
}
