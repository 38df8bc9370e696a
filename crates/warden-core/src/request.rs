use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::TimestampUs;

// ── ContextValue ─────────────────────────────────────────────────────────────

/// A flat context scalar. Conditions reference flat keys only; nested
/// structures are rejected at the wire boundary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ContextValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl ContextValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextValue::Str(s) => write!(f, "{s}"),
            ContextValue::Int(i) => write!(f, "{i}"),
            ContextValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

// ── DecisionRequest ──────────────────────────────────────────────────────────

/// A validated decision request. This is the canonical record the engine
/// evaluates and the service digests; the wall clock is captured once at
/// ingress and frozen here for the lifetime of the decision.
///
/// The request digest is SHA-256 of the canonical encoding of all fields in
/// the fixed order `tenant_id | actor_id | action_id | resource_id? |
/// data_class? | context | risk_level? | wall_clock_us | request_id`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionRequest {
    /// Caller-supplied or generated (UUIDv4) identifier for idempotent replay.
    pub request_id: String,

    /// Isolation scope; each tenant owns an independent ledger chain.
    pub tenant_id: String,

    /// The actor proposing the action.
    pub actor_id: String,

    /// The action being proposed.
    pub action_id: String,

    /// Optional concrete resource identifier (informational to the engine).
    pub resource_id: Option<String>,

    /// Optional data class of the touched resource.
    pub data_class: Option<String>,

    /// Flat scalar context. BTreeMap keeps iteration key-sorted, which the
    /// canonical encoder requires.
    pub context: BTreeMap<String, ContextValue>,

    /// Caller-declared risk level (1..=5); feeds risk escalation.
    pub risk_level: Option<u8>,

    /// Wall clock at ingress, microseconds UTC. The only time the engine sees.
    pub wall_clock_us: TimestampUs,
}

// ── Principal ────────────────────────────────────────────────────────────────

/// Authenticated caller identity injected by the enclosing service. The core
/// trusts it; authentication happens outside.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: String,
    pub subject: String,
    pub roles: Vec<String>,
}
