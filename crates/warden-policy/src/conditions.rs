use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use warden_core::request::ContextValue;

/// A predicate attached to a Permits or Requires rule.
///
/// `escalate_on_fail` transforms a required-condition failure into Escalate
/// instead of Deny; on permit conditions it is carried but only consulted in
/// the requires pass.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub escalate_on_fail: bool,
}

/// The closed set of condition semantics.
///
/// `Unknown` represents a condition type this build does not understand
/// (e.g. a policy snapshot written by a newer loader). The loader rejects it
/// at load time; the engine evaluates it as false and emits a
/// `degraded_policy` trace step — it never silently permits.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionKind {
    /// True iff the request's wall clock falls inside the window. Minutes
    /// are local to the fixed offset; `days` are ISO weekday numbers (1=Mon).
    TimeWindow {
        start_minute: u16,
        end_minute: u16,
        tz_offset_minutes: i32,
        days: BTreeSet<u8>,
    },

    /// True iff the injected counter for the selected key is below `max`.
    /// The engine does not count; the observed count is an input.
    RateLimit {
        key_selector: String,
        max: u64,
        window_secs: u32,
    },

    /// True iff the context carries a signer-verified approval token for
    /// this role.
    ApprovalPresent { approver_role: String },

    /// Exact match over one flat context field.
    ContextEquals { field: String, value: ContextValue },

    /// Membership over one flat context field.
    ContextIn {
        field: String,
        values: Vec<ContextValue>,
    },

    /// The request's data class has sensitivity <= limit.
    DataSensitivityAtMost { limit: u8 },

    /// The requesting actor has trust_level >= limit.
    ActorTrustAtLeast { limit: u8 },

    /// Unrecognized condition type. Fail-closed.
    Unknown,
}

impl ConditionKind {
    /// Canonical encoding tag; part of the policy version hash input.
    pub fn tag(&self) -> u8 {
        match self {
            ConditionKind::TimeWindow { .. } => 0,
            ConditionKind::RateLimit { .. } => 1,
            ConditionKind::ApprovalPresent { .. } => 2,
            ConditionKind::ContextEquals { .. } => 3,
            ConditionKind::ContextIn { .. } => 4,
            ConditionKind::DataSensitivityAtMost { .. } => 5,
            ConditionKind::ActorTrustAtLeast { .. } => 6,
            ConditionKind::Unknown => 255,
        }
    }

    /// Short name used in reason-trace details.
    pub fn name(&self) -> &'static str {
        match self {
            ConditionKind::TimeWindow { .. } => "time_window",
            ConditionKind::RateLimit { .. } => "rate_limit",
            ConditionKind::ApprovalPresent { .. } => "approval_present",
            ConditionKind::ContextEquals { .. } => "context_equals",
            ConditionKind::ContextIn { .. } => "context_in",
            ConditionKind::DataSensitivityAtMost { .. } => "data_sensitivity_at_most",
            ConditionKind::ActorTrustAtLeast { .. } => "actor_trust_at_least",
            ConditionKind::Unknown => "unknown",
        }
    }
}

/// Parse an "HH:MM" clock string into minutes since midnight.
pub fn parse_clock_minute(s: &str) -> Option<u16> {
    let (h, m) = s.split_once(':')?;
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Parse a weekday name ("mon".."sun", case-insensitive) into ISO 1..=7.
pub fn parse_weekday(s: &str) -> Option<u8> {
    match s.to_ascii_lowercase().as_str() {
        "mon" => Some(1),
        "tue" => Some(2),
        "wed" => Some(3),
        "thu" => Some(4),
        "fri" => Some(5),
        "sat" => Some(6),
        "sun" => Some(7),
        _ => None,
    }
}
