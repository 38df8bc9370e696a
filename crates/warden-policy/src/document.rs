use serde::Deserialize;

use warden_core::error::WardenError;
use warden_core::request::ContextValue;

/// The JSON-facing policy document, as supplied by the policy source.
///
/// This is the parse target only; the loader turns it into an immutable
/// `Policy` after validation. Unknown top-level fields are rejected.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    pub policy_id: String,
    pub version: String,
    pub mode: String,

    #[serde(default)]
    pub actions: Vec<TermDoc>,
    #[serde(default)]
    pub actors: Vec<TermDoc>,
    #[serde(default)]
    pub data_classes: Vec<TermDoc>,

    #[serde(default)]
    pub rules: Vec<RuleDoc>,

    pub default_token_ttl_secs: u32,

    #[serde(default)]
    pub escalation_threshold: Option<u8>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermDoc {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 1..=5; risk_level / trust_level / sensitivity depending on section.
    #[serde(
        default,
        alias = "risk_level",
        alias = "trust_level",
        alias = "sensitivity"
    )]
    pub level: Option<u8>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDoc {
    Permits {
        id: String,
        actor: String,
        action: String,
        #[serde(default)]
        data_class: Option<String>,
        #[serde(default)]
        conditions: Vec<ConditionDoc>,
    },
    Forbids {
        id: String,
        actor: String,
        action: String,
        #[serde(default)]
        data_class: Option<String>,
        reason: String,
    },
    Requires {
        id: String,
        action: String,
        #[serde(default)]
        conditions: Vec<ConditionDoc>,
    },
    Implies {
        id: String,
        action: String,
        implied_action: String,
    },
}

impl RuleDoc {
    pub fn id(&self) -> &str {
        match self {
            RuleDoc::Permits { id, .. }
            | RuleDoc::Forbids { id, .. }
            | RuleDoc::Requires { id, .. }
            | RuleDoc::Implies { id, .. } => id,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConditionDoc {
    #[serde(flatten)]
    pub kind: ConditionKindDoc,
    #[serde(default)]
    pub escalate_on_fail: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKindDoc {
    TimeWindow {
        start: String,
        end: String,
        #[serde(default)]
        tz_offset_minutes: i32,
        days_of_week: Vec<String>,
    },
    RateLimit {
        key: String,
        max: u64,
        window_secs: u32,
    },
    ApprovalPresent {
        approver_role: String,
    },
    ContextEquals {
        field: String,
        value: serde_json::Value,
    },
    ContextIn {
        field: String,
        values: Vec<serde_json::Value>,
    },
    DataSensitivityAtMost {
        limit: u8,
    },
    ActorTrustAtLeast {
        limit: u8,
    },
    /// Anything this build does not recognize. Kept through parsing so the
    /// loader can reject it with a useful error.
    #[serde(other)]
    Unknown,
}

/// Parse a policy document from JSON text.
pub fn parse_json(text: &str) -> Result<PolicyDocument, WardenError> {
    serde_json::from_str(text).map_err(|e| WardenError::PolicyParse(e.to_string()))
}

/// Convert a JSON scalar into a flat context value. Floats and composites
/// are rejected; the context model is string/int64/bool only.
pub fn context_value_from_json(v: &serde_json::Value) -> Option<ContextValue> {
    match v {
        serde_json::Value::String(s) => Some(ContextValue::Str(s.clone())),
        serde_json::Value::Bool(b) => Some(ContextValue::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(ContextValue::Int),
        _ => None,
    }
}
