use std::collections::HashMap;
use std::sync::Mutex;

use warden_core::decision::DecisionResponse;
use warden_core::types::{RequestDigest, TimestampUs};
use warden_core::MICROS_PER_SEC;

/// One retained decision, keyed by (tenant, request_id).
#[derive(Clone)]
struct CachedDecision {
    digest: RequestDigest,
    /// The wall clock frozen into the original request. A retry's digest is
    /// recomputed against this value so that only client-visible field
    /// changes can differ.
    wall_clock_us: TimestampUs,
    response: DecisionResponse,
    stored_at_us: TimestampUs,
}

/// What a lookup found.
pub enum Replay {
    /// Same request_id, same digest: hand back the stored response verbatim.
    Hit(Box<DecisionResponse>, TimestampUs),
    /// Same request_id, different digest.
    DigestMismatch,
    Miss,
}

/// Bounded-retention replay cache for `request_id` idempotency. Expired
/// records are pruned opportunistically on insert.
pub struct IdempotencyCache {
    entries: Mutex<HashMap<(String, String), CachedDecision>>,
    retention_secs: i64,
}

impl IdempotencyCache {
    pub fn new(retention_secs: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention_secs,
        }
    }

    /// Look up `request_id` for a tenant. The caller recomputes the candidate
    /// digest with the stored wall clock (returned by `wall_clock_for`) and
    /// passes it here for comparison.
    pub fn lookup(
        &self,
        tenant_id: &str,
        request_id: &str,
        candidate_digest: &RequestDigest,
        now_us: TimestampUs,
    ) -> Replay {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(&(tenant_id.to_string(), request_id.to_string())) {
            None => Replay::Miss,
            Some(cached) if self.expired(cached, now_us) => Replay::Miss,
            Some(cached) if cached.digest == *candidate_digest => {
                Replay::Hit(Box::new(cached.response.clone()), cached.wall_clock_us)
            }
            Some(_) => Replay::DigestMismatch,
        }
    }

    /// The wall clock of the retained request, if any. Needed before digest
    /// recomputation.
    pub fn wall_clock_for(
        &self,
        tenant_id: &str,
        request_id: &str,
        now_us: TimestampUs,
    ) -> Option<TimestampUs> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .get(&(tenant_id.to_string(), request_id.to_string()))
            .filter(|cached| !self.expired(cached, now_us))
            .map(|cached| cached.wall_clock_us)
    }

    pub fn store(
        &self,
        tenant_id: &str,
        request_id: &str,
        digest: RequestDigest,
        wall_clock_us: TimestampUs,
        response: DecisionResponse,
        now_us: TimestampUs,
    ) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|_, cached| !self.expired(cached, now_us));
        entries.insert(
            (tenant_id.to_string(), request_id.to_string()),
            CachedDecision {
                digest,
                wall_clock_us,
                response,
                stored_at_us: now_us,
            },
        );
    }

    fn expired(&self, cached: &CachedDecision, now_us: TimestampUs) -> bool {
        now_us - cached.stored_at_us > self.retention_secs * MICROS_PER_SEC
    }
}
