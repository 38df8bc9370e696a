use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use warden_codec::{put_context_value, CanonicalWriter};
use warden_core::types::PolicyVersionHash;

use crate::conditions::{Condition, ConditionKind};
use crate::relations::{Forbid, Implication, Permit, Require};
use crate::terms::Term;

// ── PolicyMode ───────────────────────────────────────────────────────────────

/// Default verdict when no forbid matched and no permit was satisfied:
/// strict denies, permissive allows.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicyMode {
    Strict,
    Permissive,
}

impl PolicyMode {
    pub fn tag(self) -> u8 {
        match self {
            PolicyMode::Strict => 0,
            PolicyMode::Permissive => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Strict => "strict",
            PolicyMode::Permissive => "permissive",
        }
    }
}

// ── Policy ───────────────────────────────────────────────────────────────────

/// An immutable, loaded policy version.
///
/// `version_hash` is SHA-256 of the canonical encoding of every other field
/// and is the identity pinned by ledger entries and capability tokens. The
/// loader stamps it after validation; nothing mutates a Policy afterwards.
///
/// Relation vectors are sorted by rule id, which both stabilises the version
/// hash and gives the engine its rule-id-ascending trace order for free.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    /// Human-facing label ("v1.0.0"); informational, never verified against.
    pub version_string: String,
    pub mode: PolicyMode,

    pub actions: BTreeMap<String, Term>,
    pub actors: BTreeMap<String, Term>,
    pub data_classes: BTreeMap<String, Term>,

    pub permits: Vec<Permit>,
    pub forbids: Vec<Forbid>,
    pub requires: Vec<Require>,
    pub implications: Vec<Implication>,

    pub default_token_ttl_secs: u32,
    pub escalation_threshold: u8,

    pub version_hash: PolicyVersionHash,
}

impl Policy {
    /// Attribute lookups used by term-level conditions.
    pub fn actor_trust(&self, actor_id: &str) -> Option<u8> {
        self.actors.get(actor_id).and_then(|t| t.level)
    }

    pub fn data_sensitivity(&self, data_class: &str) -> Option<u8> {
        self.data_classes.get(data_class).and_then(|t| t.level)
    }

    pub fn action_risk(&self, action_id: &str) -> Option<u8> {
        self.actions.get(action_id).and_then(|t| t.level)
    }

    /// Canonical encoding of everything except `version_hash`; the input to
    /// the version hash. Field order and framing are frozen format code.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::with_capacity(1024);
        w.put_string(&self.policy_id);
        w.put_string(&self.version_string);
        w.put_u8(self.mode.tag());

        for terms in [&self.actions, &self.actors, &self.data_classes] {
            w.put_u32_be(terms.len() as u32);
            for term in terms.values() {
                w.put_string(&term.id);
                w.put_opt(term.description.as_deref(), |w, d| w.put_string(d));
                w.put_opt(term.level.as_ref(), |w, l| w.put_u8(*l));
            }
        }

        w.put_u32_be(self.permits.len() as u32);
        for p in &self.permits {
            w.put_string(&p.rule_id);
            w.put_string(p.actor.as_str());
            w.put_string(p.action.as_str());
            w.put_opt(p.data_class.as_deref(), |w, d| w.put_string(d));
            put_conditions(&mut w, &p.conditions);
        }

        w.put_u32_be(self.forbids.len() as u32);
        for f in &self.forbids {
            w.put_string(&f.rule_id);
            w.put_string(f.actor.as_str());
            w.put_string(f.action.as_str());
            w.put_opt(f.data_class.as_deref(), |w, d| w.put_string(d));
            w.put_string(&f.reason);
        }

        w.put_u32_be(self.requires.len() as u32);
        for r in &self.requires {
            w.put_string(&r.rule_id);
            w.put_string(r.action.as_str());
            put_conditions(&mut w, &r.conditions);
        }

        w.put_u32_be(self.implications.len() as u32);
        for i in &self.implications {
            w.put_string(&i.rule_id);
            w.put_string(&i.action);
            w.put_string(&i.implied_action);
        }

        w.put_u32_be(self.default_token_ttl_secs);
        w.put_u8(self.escalation_threshold);
        w.into_bytes()
    }
}

fn put_conditions(w: &mut CanonicalWriter, conditions: &[Condition]) {
    w.put_u32_be(conditions.len() as u32);
    for c in conditions {
        w.put_u8(c.kind.tag());
        match &c.kind {
            ConditionKind::TimeWindow {
                start_minute,
                end_minute,
                tz_offset_minutes,
                days,
            } => {
                w.put_u32_be(*start_minute as u32);
                w.put_u32_be(*end_minute as u32);
                w.put_i64_be(*tz_offset_minutes as i64);
                w.put_u32_be(days.len() as u32);
                for d in days {
                    w.put_u8(*d);
                }
            }
            ConditionKind::RateLimit {
                key_selector,
                max,
                window_secs,
            } => {
                w.put_string(key_selector);
                w.put_u64_be(*max);
                w.put_u32_be(*window_secs);
            }
            ConditionKind::ApprovalPresent { approver_role } => {
                w.put_string(approver_role);
            }
            ConditionKind::ContextEquals { field, value } => {
                w.put_string(field);
                put_context_value(w, value);
            }
            ConditionKind::ContextIn { field, values } => {
                w.put_string(field);
                w.put_u32_be(values.len() as u32);
                for v in values {
                    put_context_value(w, v);
                }
            }
            ConditionKind::DataSensitivityAtMost { limit } => w.put_u8(*limit),
            ConditionKind::ActorTrustAtLeast { limit } => w.put_u8(*limit),
            ConditionKind::Unknown => {}
        }
        w.put_u8(u8::from(c.escalate_on_fail));
    }
}

// ── ActivePolicy ─────────────────────────────────────────────────────────────

use std::sync::{Arc, RwLock};

/// The single atomically swappable reference to the policy in effect.
///
/// Readers capture an `Arc<Policy>` once at ingress and use it for the
/// decision's entire lifetime; a concurrent swap never affects an in-flight
/// evaluation, and the superseded version is freed when its last reader
/// finishes.
pub struct ActivePolicy {
    inner: RwLock<Arc<Policy>>,
}

impl ActivePolicy {
    pub fn new(initial: Arc<Policy>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Capture the current policy reference.
    pub fn capture(&self) -> Arc<Policy> {
        Arc::clone(&self.inner.read().unwrap_or_else(|p| p.into_inner()))
    }

    /// Publish a new version; returns the superseded one.
    pub fn swap(&self, next: Arc<Policy>) -> Arc<Policy> {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_policy(mode: PolicyMode) -> Policy {
        Policy {
            policy_id: "base".into(),
            version_string: "v1".into(),
            mode,
            actions: BTreeMap::new(),
            actors: BTreeMap::new(),
            data_classes: BTreeMap::new(),
            permits: vec![],
            forbids: vec![],
            requires: vec![],
            implications: vec![],
            default_token_ttl_secs: 600,
            escalation_threshold: 4,
            version_hash: PolicyVersionHash(warden_core::types::Hash256::ZERO),
        }
    }

    #[test]
    fn canonical_bytes_differ_by_mode() {
        let strict = tiny_policy(PolicyMode::Strict);
        let permissive = tiny_policy(PolicyMode::Permissive);
        assert_ne!(strict.canonical_bytes(), permissive.canonical_bytes());
    }

    #[test]
    fn active_policy_capture_survives_swap() {
        let first = Arc::new(tiny_policy(PolicyMode::Strict));
        let active = ActivePolicy::new(Arc::clone(&first));

        let captured = active.capture();
        let second = Arc::new(tiny_policy(PolicyMode::Permissive));
        let superseded = active.swap(Arc::clone(&second));

        assert!(Arc::ptr_eq(&captured, &superseded));
        assert!(Arc::ptr_eq(&active.capture(), &second));
    }
}
