use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use warden_core::constants::MAX_TOKEN_TTL_SECS;
use warden_core::error::WardenError;
use warden_core::types::{Hash256, PolicyVersionHash};
use warden_core::DEFAULT_ESCALATION_THRESHOLD;

use crate::conditions::{parse_clock_minute, parse_weekday, Condition, ConditionKind};
use crate::document::{
    context_value_from_json, ConditionDoc, ConditionKindDoc, PolicyDocument, RuleDoc,
};
use crate::model::{Policy, PolicyMode};
use crate::relations::{Forbid, Implication, Pattern, Permit, Require};
use crate::terms::{Term, TermKind};

/// Operator-facing warning emitted during a successful load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadWarning {
    pub rule_id: String,
    pub message: String,
}

/// A validated, hashed policy plus the warnings its load produced.
pub struct LoadedPolicy {
    pub policy: Arc<Policy>,
    pub warnings: Vec<LoadWarning>,
}

/// Validate a parsed document and build the immutable `Policy`, stamping its
/// version hash. Every check must pass or the load fails and the previously
/// published policy stays in effect.
pub fn load_document(doc: PolicyDocument) -> Result<LoadedPolicy, WardenError> {
    let mode = match doc.mode.as_str() {
        "strict" => PolicyMode::Strict,
        "permissive" => PolicyMode::Permissive,
        other => {
            return Err(WardenError::PolicyParse(format!(
                "unknown mode {other:?}; expected \"strict\" or \"permissive\""
            )))
        }
    };

    if doc.default_token_ttl_secs == 0 || doc.default_token_ttl_secs > MAX_TOKEN_TTL_SECS {
        return Err(WardenError::TokenTtlOutOfBounds {
            max: MAX_TOKEN_TTL_SECS,
            got: doc.default_token_ttl_secs,
        });
    }

    let actions = build_terms(TermKind::Action, &doc.actions)?;
    let actors = build_terms(TermKind::Actor, &doc.actors)?;
    let data_classes = build_terms(TermKind::DataClass, &doc.data_classes)?;

    // ── Rule id uniqueness ───────────────────────────────────────────────────
    let mut seen_rules = std::collections::BTreeSet::new();
    for rule in &doc.rules {
        if !seen_rules.insert(rule.id().to_string()) {
            return Err(WardenError::DuplicateRule(rule.id().to_string()));
        }
    }

    // ── Build relations, checking every term reference ───────────────────────
    let mut permits = Vec::new();
    let mut forbids = Vec::new();
    let mut requires = Vec::new();
    let mut implications = Vec::new();

    for rule in &doc.rules {
        match rule {
            RuleDoc::Permits {
                id,
                actor,
                action,
                data_class,
                conditions,
            } => {
                check_term_ref(id, TermKind::Actor, actor, &actors)?;
                check_term_ref(id, TermKind::Action, action, &actions)?;
                check_data_class_ref(id, data_class.as_deref(), &data_classes)?;
                permits.push(Permit {
                    rule_id: id.clone(),
                    actor: Pattern::parse(actor),
                    action: Pattern::parse(action),
                    data_class: data_class.clone(),
                    conditions: build_conditions(id, conditions)?,
                });
            }
            RuleDoc::Forbids {
                id,
                actor,
                action,
                data_class,
                reason,
            } => {
                check_term_ref(id, TermKind::Actor, actor, &actors)?;
                check_term_ref(id, TermKind::Action, action, &actions)?;
                check_data_class_ref(id, data_class.as_deref(), &data_classes)?;
                forbids.push(Forbid {
                    rule_id: id.clone(),
                    actor: Pattern::parse(actor),
                    action: Pattern::parse(action),
                    data_class: data_class.clone(),
                    reason: reason.clone(),
                });
            }
            RuleDoc::Requires {
                id,
                action,
                conditions,
            } => {
                check_term_ref(id, TermKind::Action, action, &actions)?;
                requires.push(Require {
                    rule_id: id.clone(),
                    action: Pattern::parse(action),
                    conditions: build_conditions(id, conditions)?,
                });
            }
            RuleDoc::Implies {
                id,
                action,
                implied_action,
            } => {
                if action == "*" || implied_action == "*" {
                    return Err(WardenError::MalformedCondition {
                        rule_id: id.clone(),
                        detail: "implies does not accept wildcards".into(),
                    });
                }
                check_term_ref(id, TermKind::Action, action, &actions)?;
                check_term_ref(id, TermKind::Action, implied_action, &actions)?;
                if action == implied_action {
                    return Err(WardenError::ImpliesSelfLoop(id.clone()));
                }
                implications.push(Implication {
                    rule_id: id.clone(),
                    action: action.clone(),
                    implied_action: implied_action.clone(),
                });
            }
        }
    }

    // Stable order: rule id ascending. Stabilises the version hash and the
    // engine's trace ordering.
    permits.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    forbids.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    requires.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    implications.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

    // ── Permit/forbid shadow warnings ────────────────────────────────────────
    // A forbid always wins at evaluation time; overlapping triples are legal
    // but usually an authoring mistake, so surface them for operator review.
    let mut warnings = Vec::new();
    for p in &permits {
        for f in &forbids {
            if p.actor == f.actor && p.action == f.action && p.data_class == f.data_class {
                let message = format!(
                    "permit {} is shadowed by forbid {} on ({}, {}, {})",
                    p.rule_id,
                    f.rule_id,
                    p.actor.as_str(),
                    p.action.as_str(),
                    p.data_class.as_deref().unwrap_or("*"),
                );
                warn!(rule_id = %p.rule_id, "{message}");
                warnings.push(LoadWarning {
                    rule_id: p.rule_id.clone(),
                    message,
                });
            }
        }
    }

    let mut policy = Policy {
        policy_id: doc.policy_id,
        version_string: doc.version,
        mode,
        actions,
        actors,
        data_classes,
        permits,
        forbids,
        requires,
        implications,
        default_token_ttl_secs: doc.default_token_ttl_secs,
        escalation_threshold: doc
            .escalation_threshold
            .unwrap_or(DEFAULT_ESCALATION_THRESHOLD),
        version_hash: PolicyVersionHash(Hash256::ZERO),
    };
    policy.version_hash = warden_crypto::policy_version_hash(&policy.canonical_bytes());

    Ok(LoadedPolicy {
        policy: Arc::new(policy),
        warnings,
    })
}

fn build_terms(
    kind: TermKind,
    docs: &[crate::document::TermDoc],
) -> Result<BTreeMap<String, Term>, WardenError> {
    let mut map = BTreeMap::new();
    for doc in docs {
        if let Some(level) = doc.level {
            if !(1..=5).contains(&level) {
                return Err(WardenError::PolicyParse(format!(
                    "{} term {} has {} {} outside 1..=5",
                    kind.as_str(),
                    doc.id,
                    kind.attribute_name(),
                    level
                )));
            }
        }
        let term = Term {
            id: doc.id.clone(),
            description: doc.description.clone(),
            level: doc.level,
        };
        if map.insert(doc.id.clone(), term).is_some() {
            return Err(WardenError::DuplicateTerm {
                kind: kind.as_str(),
                id: doc.id.clone(),
            });
        }
    }
    Ok(map)
}

fn check_term_ref(
    rule_id: &str,
    kind: TermKind,
    pattern: &str,
    terms: &BTreeMap<String, Term>,
) -> Result<(), WardenError> {
    if pattern == "*" || terms.contains_key(pattern) {
        return Ok(());
    }
    Err(WardenError::UnknownTerm {
        rule_id: rule_id.to_string(),
        kind: kind.as_str(),
        id: pattern.to_string(),
    })
}

fn check_data_class_ref(
    rule_id: &str,
    data_class: Option<&str>,
    terms: &BTreeMap<String, Term>,
) -> Result<(), WardenError> {
    match data_class {
        None => Ok(()),
        Some(dc) => check_term_ref(rule_id, TermKind::DataClass, dc, terms),
    }
}

fn build_conditions(
    rule_id: &str,
    docs: &[ConditionDoc],
) -> Result<Vec<Condition>, WardenError> {
    docs.iter().map(|d| build_condition(rule_id, d)).collect()
}

fn build_condition(rule_id: &str, doc: &ConditionDoc) -> Result<Condition, WardenError> {
    let malformed = |detail: String| WardenError::MalformedCondition {
        rule_id: rule_id.to_string(),
        detail,
    };

    let kind = match &doc.kind {
        ConditionKindDoc::TimeWindow {
            start,
            end,
            tz_offset_minutes,
            days_of_week,
        } => {
            let start_minute = parse_clock_minute(start)
                .ok_or_else(|| malformed(format!("bad time_window start {start:?}")))?;
            let end_minute = parse_clock_minute(end)
                .ok_or_else(|| malformed(format!("bad time_window end {end:?}")))?;
            if tz_offset_minutes.abs() > 14 * 60 {
                return Err(malformed(format!(
                    "tz_offset_minutes {tz_offset_minutes} outside ±14h"
                )));
            }
            let mut days = std::collections::BTreeSet::new();
            for d in days_of_week {
                days.insert(
                    parse_weekday(d).ok_or_else(|| malformed(format!("bad weekday {d:?}")))?,
                );
            }
            if days.is_empty() {
                return Err(malformed("time_window needs at least one weekday".into()));
            }
            ConditionKind::TimeWindow {
                start_minute,
                end_minute,
                tz_offset_minutes: *tz_offset_minutes,
                days,
            }
        }
        ConditionKindDoc::RateLimit {
            key,
            max,
            window_secs,
        } => {
            let valid_selector =
                matches!(key.as_str(), "actor" | "action" | "tenant") || key.starts_with("context:");
            if !valid_selector {
                return Err(malformed(format!("unknown rate_limit key selector {key:?}")));
            }
            if *window_secs == 0 {
                return Err(malformed("rate_limit window_secs must be > 0".into()));
            }
            ConditionKind::RateLimit {
                key_selector: key.clone(),
                max: *max,
                window_secs: *window_secs,
            }
        }
        ConditionKindDoc::ApprovalPresent { approver_role } => {
            if approver_role.is_empty() {
                return Err(malformed("approver_role must not be empty".into()));
            }
            ConditionKind::ApprovalPresent {
                approver_role: approver_role.clone(),
            }
        }
        ConditionKindDoc::ContextEquals { field, value } => ConditionKind::ContextEquals {
            field: field.clone(),
            value: context_value_from_json(value)
                .ok_or_else(|| malformed(format!("context_equals value for {field:?} is not a flat scalar")))?,
        },
        ConditionKindDoc::ContextIn { field, values } => {
            let mut parsed = Vec::with_capacity(values.len());
            for v in values {
                parsed.push(context_value_from_json(v).ok_or_else(|| {
                    malformed(format!("context_in value for {field:?} is not a flat scalar"))
                })?);
            }
            if parsed.is_empty() {
                return Err(malformed("context_in needs at least one value".into()));
            }
            ConditionKind::ContextIn {
                field: field.clone(),
                values: parsed,
            }
        }
        ConditionKindDoc::DataSensitivityAtMost { limit } => {
            check_level(rule_id, *limit)?;
            ConditionKind::DataSensitivityAtMost { limit: *limit }
        }
        ConditionKindDoc::ActorTrustAtLeast { limit } => {
            check_level(rule_id, *limit)?;
            ConditionKind::ActorTrustAtLeast { limit: *limit }
        }
        ConditionKindDoc::Unknown => {
            return Err(malformed("unknown condition type".into()));
        }
    };

    Ok(Condition {
        kind,
        escalate_on_fail: doc.escalate_on_fail,
    })
}

fn check_level(rule_id: &str, level: u8) -> Result<(), WardenError> {
    if (1..=5).contains(&level) {
        return Ok(());
    }
    Err(WardenError::MalformedCondition {
        rule_id: rule_id.to_string(),
        detail: format!("level {level} outside 1..=5"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_json;

    fn base_doc(rules: &str) -> String {
        format!(
            r#"{{
                "policy_id": "base",
                "version": "v1.0.0",
                "mode": "strict",
                "actions": [
                    {{"id": "search_web", "risk_level": 1}},
                    {{"id": "send_email", "risk_level": 3}}
                ],
                "actors": [{{"id": "model", "trust_level": 1}}],
                "data_classes": [{{"id": "pii", "sensitivity": 5}}],
                "rules": [{rules}],
                "default_token_ttl_secs": 600
            }}"#
        )
    }

    #[test]
    fn loads_and_stamps_version_hash() {
        let doc = parse_json(&base_doc(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
        ))
        .unwrap();
        let loaded = load_document(doc).unwrap();
        assert_ne!(loaded.policy.version_hash.0, Hash256::ZERO);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn version_hash_is_content_addressed() {
        let a = load_document(
            parse_json(&base_doc(
                r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
            ))
            .unwrap(),
        )
        .unwrap();
        let b = load_document(
            parse_json(&base_doc(
                r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
            ))
            .unwrap(),
        )
        .unwrap();
        let c = load_document(
            parse_json(&base_doc(
                r#"{"type": "permits", "id": "p1", "actor": "model", "action": "send_email"}"#,
            ))
            .unwrap(),
        )
        .unwrap();
        assert_eq!(a.policy.version_hash, b.policy.version_hash);
        assert_ne!(a.policy.version_hash, c.policy.version_hash);
    }

    #[test]
    fn unknown_term_reference_fails() {
        let doc = parse_json(&base_doc(
            r#"{"type": "permits", "id": "p1", "actor": "ghost", "action": "search_web"}"#,
        ))
        .unwrap();
        assert!(matches!(
            load_document(doc),
            Err(WardenError::UnknownTerm { .. })
        ));
    }

    #[test]
    fn duplicate_rule_id_fails() {
        let doc = parse_json(&base_doc(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
               {"type": "forbids", "id": "p1", "actor": "model", "action": "search_web", "reason": "dup"}"#,
        ))
        .unwrap();
        assert!(matches!(
            load_document(doc),
            Err(WardenError::DuplicateRule(_))
        ));
    }

    #[test]
    fn implies_self_loop_fails() {
        let doc = parse_json(&base_doc(
            r#"{"type": "implies", "id": "i1", "action": "search_web", "implied_action": "search_web"}"#,
        ))
        .unwrap();
        assert!(matches!(
            load_document(doc),
            Err(WardenError::ImpliesSelfLoop(_))
        ));
    }

    #[test]
    fn ttl_out_of_bounds_fails() {
        let text = base_doc(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
        )
        .replace("\"default_token_ttl_secs\": 600", "\"default_token_ttl_secs\": 3600");
        let doc = parse_json(&text).unwrap();
        assert!(matches!(
            load_document(doc),
            Err(WardenError::TokenTtlOutOfBounds { .. })
        ));
    }

    #[test]
    fn shadowed_permit_warns_but_loads() {
        let doc = parse_json(&base_doc(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
               {"type": "forbids", "id": "f1", "actor": "model", "action": "search_web", "reason": "maintenance"}"#,
        ))
        .unwrap();
        let loaded = load_document(doc).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].message.contains("f1"));
    }

    #[test]
    fn unknown_condition_type_fails_load() {
        let doc = parse_json(&base_doc(
            r#"{"type": "requires", "id": "r1", "action": "search_web",
                "conditions": [{"type": "quantum_check"}]}"#,
        ))
        .unwrap();
        assert!(matches!(
            load_document(doc),
            Err(WardenError::MalformedCondition { .. })
        ));
    }
}
