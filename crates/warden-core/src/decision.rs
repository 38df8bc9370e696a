use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::token::CapabilityToken;
use crate::types::{Ed25519Signature, Hash256, PolicyVersionHash, Seq, TimestampUs};

// ── Verdict ──────────────────────────────────────────────────────────────────

/// The three possible answers to a decision request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    Escalate,
}

impl Verdict {
    /// Canonical encoding tag. Stable; part of the wire format.
    pub fn tag(self) -> u8 {
        match self {
            Verdict::Allow => 0,
            Verdict::Deny => 1,
            Verdict::Escalate => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Verdict::Allow),
            1 => Some(Verdict::Deny),
            2 => Some(Verdict::Escalate),
            _ => None,
        }
    }

    /// The meet (most restrictive) of two verdicts under the lattice
    /// `Allow < Escalate < Deny`.
    pub fn meet(self, other: Verdict) -> Verdict {
        use Verdict::*;
        match (self, other) {
            (Deny, _) | (_, Deny) => Deny,
            (Escalate, _) | (_, Escalate) => Escalate,
            (Allow, Allow) => Allow,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Deny => write!(f, "deny"),
            Verdict::Escalate => write!(f, "escalate"),
        }
    }
}

// ── Reason trace ─────────────────────────────────────────────────────────────

/// The role a rule played in reaching the verdict.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReasonRole {
    Forbid,
    Permit,
    RequiredUnmet,
    Default,
    ImpliedBy,
    EscalationTrigger,
    DegradedPolicy,
}

impl ReasonRole {
    /// Canonical encoding tag. Stable; feeds the reason-trace digest.
    pub fn tag(self) -> u8 {
        match self {
            ReasonRole::Forbid => 0,
            ReasonRole::Permit => 1,
            ReasonRole::RequiredUnmet => 2,
            ReasonRole::Default => 3,
            ReasonRole::ImpliedBy => 4,
            ReasonRole::EscalationTrigger => 5,
            ReasonRole::DegradedPolicy => 6,
        }
    }
}

/// One step of the reason trace: which rule contributed and how.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReasonStep {
    /// Rule id, or a fixed marker ("default", "risk_escalation",
    /// "engine_internal") for steps not tied to an authored rule.
    pub rule_id: String,
    pub role: ReasonRole,
    /// Human-readable detail (forbid reason, unmet condition name, ...).
    pub detail: Option<String>,
}

impl ReasonStep {
    pub fn new(rule_id: impl Into<String>, role: ReasonRole) -> Self {
        Self {
            rule_id: rule_id.into(),
            role,
            detail: None,
        }
    }

    pub fn with_detail(rule_id: impl Into<String>, role: ReasonRole, detail: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            role,
            detail: Some(detail.into()),
        }
    }
}

// ── EvaluationOutcome ────────────────────────────────────────────────────────

/// The engine's complete answer for one request against one policy version.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub verdict: Verdict,
    pub reason_trace: Vec<ReasonStep>,
    pub matched_rule_ids: BTreeSet<String>,
    /// The request's wall clock, echoed back. The engine reads no clock.
    pub evaluated_at: TimestampUs,
}

// ── DecisionResponse ─────────────────────────────────────────────────────────

/// What the decision service returns to the caller after the ledger entry is
/// durable. Replayed verbatim on idempotent request_id retries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub decision_id: String,
    pub verdict: Verdict,
    pub reason_trace: Vec<ReasonStep>,
    pub token: Option<CapabilityToken>,
    pub seq: Seq,
    pub entry_hash: Hash256,
    pub entry_signature: Ed25519Signature,
    pub policy_version_hash: PolicyVersionHash,
    pub issued_at: TimestampUs,
    pub expires_at: Option<TimestampUs>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_is_most_restrictive() {
        use Verdict::*;
        assert_eq!(Allow.meet(Allow), Allow);
        assert_eq!(Allow.meet(Escalate), Escalate);
        assert_eq!(Escalate.meet(Allow), Escalate);
        assert_eq!(Allow.meet(Deny), Deny);
        assert_eq!(Deny.meet(Escalate), Deny);
        assert_eq!(Escalate.meet(Escalate), Escalate);
    }

    #[test]
    fn verdict_tags_round_trip() {
        for v in [Verdict::Allow, Verdict::Deny, Verdict::Escalate] {
            assert_eq!(Verdict::from_tag(v.tag()), Some(v));
        }
        assert_eq!(Verdict::from_tag(9), None);
    }
}
