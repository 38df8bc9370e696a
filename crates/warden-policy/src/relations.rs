use serde::{Deserialize, Serialize};

use crate::conditions::Condition;

// ── Pattern ──────────────────────────────────────────────────────────────────

/// One actor/action segment of a relation: a literal id or the `*` wildcard.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Exact(String),
}

impl Pattern {
    pub fn parse(s: &str) -> Pattern {
        if s == "*" {
            Pattern::Any
        } else {
            Pattern::Exact(s.to_string())
        }
    }

    /// Exact, case-sensitive match; `Any` matches every id.
    pub fn matches(&self, id: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(p) => p == id,
        }
    }

    /// Canonical string form (`*` or the literal id).
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Any => "*",
            Pattern::Exact(s) => s,
        }
    }
}

// ── Relation variants ────────────────────────────────────────────────────────

/// `Permits(actor, action, data_class?, conditions[])`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permit {
    pub rule_id: String,
    pub actor: Pattern,
    pub action: Pattern,
    /// Absent matches any data class.
    pub data_class: Option<String>,
    pub conditions: Vec<Condition>,
}

/// `Forbids(actor, action, data_class?, reason)` — unconditional, absolute
/// precedence over permits.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forbid {
    pub rule_id: String,
    pub actor: Pattern,
    pub action: Pattern,
    pub data_class: Option<String>,
    pub reason: String,
}

/// `Requires(action, conditions[])` — predicates that must hold for any
/// allow of a matching action.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Require {
    pub rule_id: String,
    pub action: Pattern,
    pub conditions: Vec<Condition>,
}

/// `Implies(action, implied_action)` — deciding `action` additionally
/// evaluates `implied_action`; the effective outcome is the meet of the two.
/// Expansion is single-level.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Implication {
    pub rule_id: String,
    pub action: String,
    pub implied_action: String,
}

/// True iff the (actor, action, data_class) shape of a relation matches the
/// request's identifiers.
pub fn triple_matches(
    actor_pat: &Pattern,
    action_pat: &Pattern,
    rel_data_class: Option<&str>,
    actor_id: &str,
    action_id: &str,
    req_data_class: Option<&str>,
) -> bool {
    if !actor_pat.matches(actor_id) || !action_pat.matches(action_id) {
        return false;
    }
    match rel_data_class {
        None => true,
        Some(dc) => req_data_class == Some(dc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        assert!(Pattern::Any.matches("anything"));
        assert!(Pattern::parse("*").matches("x"));
    }

    #[test]
    fn exact_is_case_sensitive() {
        let p = Pattern::parse("Search_Web");
        assert!(p.matches("Search_Web"));
        assert!(!p.matches("search_web"));
    }

    #[test]
    fn data_class_constrains_only_when_present() {
        assert!(triple_matches(
            &Pattern::Any,
            &Pattern::Any,
            None,
            "a",
            "b",
            None
        ));
        assert!(!triple_matches(
            &Pattern::Any,
            &Pattern::Any,
            Some("pii"),
            "a",
            "b",
            None
        ));
        assert!(triple_matches(
            &Pattern::Any,
            &Pattern::Any,
            Some("pii"),
            "a",
            "b",
            Some("pii")
        ));
        assert!(!triple_matches(
            &Pattern::Any,
            &Pattern::Any,
            Some("pii"),
            "a",
            "b",
            Some("public")
        ));
    }
}
