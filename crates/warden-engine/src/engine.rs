use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use warden_core::decision::{EvaluationOutcome, ReasonRole, ReasonStep, Verdict};
use warden_core::request::DecisionRequest;
use warden_policy::relations::triple_matches;
use warden_policy::Policy;

use crate::conditions::{condition_holds, CondEnv};
use crate::traits::{ApprovalVerifier, RateLimitObserver};

/// The decision procedure: a pure function of (policy, request) plus the
/// injected condition inputs (rate counts, approval verification).
///
/// Evaluation never reads a clock, RNG, or external state beyond those
/// seams, so a decision is replayable from its policy version hash and
/// request digest.
pub struct PolicyEngine {
    rate: Arc<dyn RateLimitObserver>,
    approvals: Arc<dyn ApprovalVerifier>,
}

impl PolicyEngine {
    pub fn new(rate: Arc<dyn RateLimitObserver>, approvals: Arc<dyn ApprovalVerifier>) -> Self {
        Self { rate, approvals }
    }

    /// Evaluate `req` against `policy`.
    ///
    /// Pass order is authoritative: forbids (absolute precedence), permits,
    /// requires, single-level implies expansion (meet under
    /// `Allow < Escalate < Deny`), mode default, risk escalation. Internal
    /// inconsistencies degrade to Deny; no panic crosses this boundary.
    pub fn evaluate(&self, policy: &Policy, req: &DecisionRequest) -> EvaluationOutcome {
        let mut trace = Vec::new();
        let mut matched = BTreeSet::new();

        let verdict = if let Some(problem) = request_sanity_problem(req) {
            trace.push(ReasonStep::with_detail(
                "engine_internal",
                ReasonRole::DegradedPolicy,
                problem,
            ));
            Verdict::Deny
        } else {
            self.evaluate_with_implications(policy, req, &mut trace, &mut matched)
        };

        debug!(
            actor = %req.actor_id,
            action = %req.action_id,
            verdict = %verdict,
            rules = matched.len(),
            "evaluated request"
        );

        EvaluationOutcome {
            verdict,
            reason_trace: trace,
            matched_rule_ids: matched,
            evaluated_at: req.wall_clock_us,
        }
    }

    fn evaluate_with_implications(
        &self,
        policy: &Policy,
        req: &DecisionRequest,
        trace: &mut Vec<ReasonStep>,
        matched: &mut BTreeSet<String>,
    ) -> Verdict {
        let mut verdict = self.evaluate_action(policy, req, &req.action_id, trace, matched);

        // Single-level expansion: implied actions are evaluated with a
        // synthetic request but never re-expanded, which bounds the trace.
        for imp in &policy.implications {
            if imp.action != req.action_id {
                continue;
            }
            matched.insert(imp.rule_id.clone());
            trace.push(ReasonStep::with_detail(
                &imp.rule_id,
                ReasonRole::ImpliedBy,
                format!("also evaluated {}", imp.implied_action),
            ));
            let implied =
                self.evaluate_action(policy, req, &imp.implied_action, trace, matched);
            verdict = verdict.meet(implied);
        }

        // Risk escalation applies to the final allow only.
        if verdict == Verdict::Allow {
            if let Some(risk) = req.risk_level {
                if risk >= policy.escalation_threshold {
                    trace.push(ReasonStep::with_detail(
                        "risk_escalation",
                        ReasonRole::EscalationTrigger,
                        format!(
                            "risk_level {risk} >= threshold {}",
                            policy.escalation_threshold
                        ),
                    ));
                    verdict = Verdict::Escalate;
                }
            }
        }

        verdict
    }

    /// Steps 2–4 and 6 for one action id (the request's own, or an implied
    /// one). Returns the verdict for that action including the mode default.
    fn evaluate_action(
        &self,
        policy: &Policy,
        req: &DecisionRequest,
        action_id: &str,
        trace: &mut Vec<ReasonStep>,
        matched: &mut BTreeSet<String>,
    ) -> Verdict {
        let env = CondEnv {
            policy,
            rate: self.rate.as_ref(),
            approvals: self.approvals.as_ref(),
        };

        // ── Forbid pass: unconditional, absolute precedence ──────────────────
        let mut forbidden = false;
        for f in &policy.forbids {
            if triple_matches(
                &f.actor,
                &f.action,
                f.data_class.as_deref(),
                &req.actor_id,
                action_id,
                req.data_class.as_deref(),
            ) {
                forbidden = true;
                matched.insert(f.rule_id.clone());
                trace.push(ReasonStep::with_detail(
                    &f.rule_id,
                    ReasonRole::Forbid,
                    f.reason.clone(),
                ));
            }
        }
        if forbidden {
            return Verdict::Deny;
        }

        // ── Permit pass: satisfied iff all conditions hold ───────────────────
        let mut permit_satisfied = false;
        for p in &policy.permits {
            if !triple_matches(
                &p.actor,
                &p.action,
                p.data_class.as_deref(),
                &req.actor_id,
                action_id,
                req.data_class.as_deref(),
            ) {
                continue;
            }
            let all_hold = p.conditions.iter().all(|c| {
                condition_holds(&env, req, action_id, &p.rule_id, c, trace)
            });
            if all_hold {
                permit_satisfied = true;
                matched.insert(p.rule_id.clone());
                trace.push(ReasonStep::new(&p.rule_id, ReasonRole::Permit));
            }
        }

        // ── Mode default when nothing permitted ──────────────────────────────
        if !permit_satisfied {
            match policy.mode {
                warden_policy::PolicyMode::Strict => {
                    trace.push(ReasonStep::with_detail(
                        "default",
                        ReasonRole::Default,
                        "strict mode",
                    ));
                    return Verdict::Deny;
                }
                warden_policy::PolicyMode::Permissive => {
                    trace.push(ReasonStep::with_detail(
                        "default",
                        ReasonRole::Default,
                        "permissive mode",
                    ));
                }
            }
        }

        // ── Requires pass on the candidate allow ─────────────────────────────
        let mut verdict = Verdict::Allow;
        for r in &policy.requires {
            if !r.action.matches(action_id) {
                continue;
            }
            matched.insert(r.rule_id.clone());
            for cond in &r.conditions {
                if condition_holds(&env, req, action_id, &r.rule_id, cond, trace) {
                    continue;
                }
                trace.push(ReasonStep::with_detail(
                    &r.rule_id,
                    ReasonRole::RequiredUnmet,
                    format!("required condition unmet: {}", cond.kind.name()),
                ));
                verdict = if cond.escalate_on_fail {
                    verdict.meet(Verdict::Escalate)
                } else {
                    Verdict::Deny
                };
            }
        }

        verdict
    }
}

/// Checks for malformed requests that should be impossible past validation.
fn request_sanity_problem(req: &DecisionRequest) -> Option<&'static str> {
    if req.actor_id.is_empty() || req.action_id.is_empty() || req.tenant_id.is_empty() {
        return Some("empty identifier survived validation");
    }
    if req.risk_level.is_some_and(|r| !(1..=5).contains(&r)) {
        return Some("risk_level outside 1..=5 survived validation");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{NoApprovals, ZeroCounts};
    use std::collections::BTreeMap;
    use warden_core::request::ContextValue;
    use warden_policy::{load_document, parse_json};

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(ZeroCounts), Arc::new(NoApprovals))
    }

    fn policy_from(rules: &str, mode: &str) -> Arc<Policy> {
        let text = format!(
            r#"{{
                "policy_id": "test",
                "version": "v1",
                "mode": "{mode}",
                "actions": [
                    {{"id": "search_web", "risk_level": 1}},
                    {{"id": "compose_email", "risk_level": 2}},
                    {{"id": "send_email", "risk_level": 3}}
                ],
                "actors": [
                    {{"id": "model", "trust_level": 1}},
                    {{"id": "ops_bot", "trust_level": 4}}
                ],
                "data_classes": [
                    {{"id": "public_data", "sensitivity": 1}},
                    {{"id": "pii", "sensitivity": 5}}
                ],
                "rules": [{rules}],
                "default_token_ttl_secs": 600
            }}"#
        );
        load_document(parse_json(&text).unwrap()).unwrap().policy
    }

    fn request(actor: &str, action: &str) -> DecisionRequest {
        DecisionRequest {
            request_id: "req-1".into(),
            tenant_id: "acme".into(),
            actor_id: actor.into(),
            action_id: action.into(),
            resource_id: None,
            data_class: None,
            context: BTreeMap::new(),
            risk_level: None,
            wall_clock_us: 1_704_110_400_000_000,
        }
    }

    #[test]
    fn simple_permit_allows() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
            "strict",
        );
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Allow);
        assert!(outcome.matched_rule_ids.contains("p1"));
    }

    #[test]
    fn forbid_wins_over_any_number_of_permits() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
               {"type": "permits", "id": "p2", "actor": "*", "action": "search_web"},
               {"type": "forbids", "id": "f1", "actor": "model", "action": "search_web", "reason": "maintenance"}"#,
            "strict",
        );
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert!(outcome
            .reason_trace
            .iter()
            .any(|s| s.role == ReasonRole::Forbid && s.detail.as_deref() == Some("maintenance")));
        // Forbid short-circuits: no permit step recorded.
        assert!(!outcome.reason_trace.iter().any(|s| s.role == ReasonRole::Permit));
    }

    #[test]
    fn strict_mode_defaults_to_deny() {
        let policy = policy_from("", "strict");
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert!(outcome
            .reason_trace
            .iter()
            .any(|s| s.role == ReasonRole::Default));
    }

    #[test]
    fn permissive_mode_defaults_to_allow() {
        let policy = policy_from("", "permissive");
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Allow);
    }

    #[test]
    fn permissive_default_still_honors_requires() {
        let policy = policy_from(
            r#"{"type": "requires", "id": "r1", "action": "search_web",
                "conditions": [{"type": "approval_present", "approver_role": "admin"}]}"#,
            "permissive",
        );
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);
    }

    #[test]
    fn unmet_required_condition_denies() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
               {"type": "requires", "id": "r1", "action": "search_web",
                "conditions": [{"type": "approval_present", "approver_role": "admin"}]}"#,
            "strict",
        );
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert!(outcome
            .reason_trace
            .iter()
            .any(|s| s.role == ReasonRole::RequiredUnmet));
    }

    #[test]
    fn escalate_on_fail_turns_deny_into_escalate() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
               {"type": "requires", "id": "r1", "action": "search_web",
                "conditions": [{"type": "approval_present", "approver_role": "admin",
                                "escalate_on_fail": true}]}"#,
            "strict",
        );
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Escalate);
    }

    #[test]
    fn satisfied_approval_allows() {
        struct AcceptAll;
        impl ApprovalVerifier for AcceptAll {
            fn approval_valid(&self, _: &str, _: &str, _: &str, _: &str, _: &str) -> bool {
                true
            }
        }
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
               {"type": "requires", "id": "r1", "action": "search_web",
                "conditions": [{"type": "approval_present", "approver_role": "admin"}]}"#,
            "strict",
        );
        let eng = PolicyEngine::new(Arc::new(ZeroCounts), Arc::new(AcceptAll));

        // Approval must be present in context even with a permissive verifier.
        let outcome = eng.evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);

        let mut req = request("model", "search_web");
        req.context.insert(
            "approval:admin".into(),
            ContextValue::Str("deadbeef".into()),
        );
        let outcome = eng.evaluate(&policy, &req);
        assert_eq!(outcome.verdict, Verdict::Allow);
    }

    #[test]
    fn implies_meet_takes_most_restrictive() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "compose_email"},
               {"type": "forbids", "id": "f1", "actor": "model", "action": "send_email", "reason": "no outbound"},
               {"type": "implies", "id": "i1", "action": "compose_email", "implied_action": "send_email"}"#,
            "strict",
        );
        let outcome = engine().evaluate(&policy, &request("model", "compose_email"));
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert!(outcome
            .reason_trace
            .iter()
            .any(|s| s.role == ReasonRole::ImpliedBy));
        assert!(outcome.matched_rule_ids.contains("i1"));
        assert!(outcome.matched_rule_ids.contains("f1"));
    }

    #[test]
    fn risk_escalation_raises_allow() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
            "strict",
        );
        let mut req = request("model", "search_web");
        req.risk_level = Some(4);
        let outcome = engine().evaluate(&policy, &req);
        assert_eq!(outcome.verdict, Verdict::Escalate);

        req.risk_level = Some(3);
        let outcome = engine().evaluate(&policy, &req);
        assert_eq!(outcome.verdict, Verdict::Allow);
    }

    #[test]
    fn risk_escalation_does_not_soften_deny() {
        let policy = policy_from(
            r#"{"type": "forbids", "id": "f1", "actor": "model", "action": "search_web", "reason": "blocked"}"#,
            "strict",
        );
        let mut req = request("model", "search_web");
        req.risk_level = Some(5);
        let outcome = engine().evaluate(&policy, &req);
        assert_eq!(outcome.verdict, Verdict::Deny);
    }

    #[test]
    fn data_class_scoped_rules_require_matching_class() {
        let policy = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web", "data_class": "public_data"}"#,
            "strict",
        );
        // No data class on the request: the scoped permit does not match.
        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);

        let mut req = request("model", "search_web");
        req.data_class = Some("public_data".into());
        let outcome = engine().evaluate(&policy, &req);
        assert_eq!(outcome.verdict, Verdict::Allow);
    }

    #[test]
    fn trust_and_sensitivity_conditions_compare_term_attributes() {
        let rules = r#"{"type": "permits", "id": "p1", "actor": "*", "action": "search_web",
                        "conditions": [{"type": "actor_trust_at_least", "limit": 3},
                                       {"type": "data_sensitivity_at_most", "limit": 2}]}"#;
        let policy = policy_from(rules, "strict");

        let mut req = request("ops_bot", "search_web");
        req.data_class = Some("public_data".into());
        assert_eq!(engine().evaluate(&policy, &req).verdict, Verdict::Allow);

        // Low-trust actor fails the permit.
        let mut req = request("model", "search_web");
        req.data_class = Some("public_data".into());
        assert_eq!(engine().evaluate(&policy, &req).verdict, Verdict::Deny);

        // Sensitive data class fails the permit.
        let mut req = request("ops_bot", "search_web");
        req.data_class = Some("pii".into());
        assert_eq!(engine().evaluate(&policy, &req).verdict, Verdict::Deny);
    }

    #[test]
    fn rate_limit_uses_injected_count() {
        struct FixedCount(u64);
        impl RateLimitObserver for FixedCount {
            fn observe(&self, _key: &str) -> u64 {
                self.0
            }
        }
        let rules = r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web",
                        "conditions": [{"type": "rate_limit", "key": "actor", "max": 5, "window_secs": 60}]}"#;
        let policy = policy_from(rules, "strict");
        let req = request("model", "search_web");

        let below = PolicyEngine::new(Arc::new(FixedCount(4)), Arc::new(NoApprovals));
        assert_eq!(below.evaluate(&policy, &req).verdict, Verdict::Allow);

        let at = PolicyEngine::new(Arc::new(FixedCount(5)), Arc::new(NoApprovals));
        assert_eq!(at.evaluate(&policy, &req).verdict, Verdict::Deny);
    }

    #[test]
    fn context_conditions_match_flat_scalars() {
        let rules = r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web",
                        "conditions": [{"type": "context_equals", "field": "region", "value": "eu"},
                                       {"type": "context_in", "field": "attempt", "values": [1, 2, 3]}]}"#;
        let policy = policy_from(rules, "strict");

        let mut req = request("model", "search_web");
        req.context.insert("region".into(), ContextValue::Str("eu".into()));
        req.context.insert("attempt".into(), ContextValue::Int(2));
        assert_eq!(engine().evaluate(&policy, &req).verdict, Verdict::Allow);

        req.context.insert("attempt".into(), ContextValue::Int(9));
        assert_eq!(engine().evaluate(&policy, &req).verdict, Verdict::Deny);
    }

    #[test]
    fn unknown_condition_fails_closed_with_degraded_step() {
        let base = policy_from(
            r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"}"#,
            "strict",
        );
        let mut policy = (*base).clone();
        policy.permits[0].conditions.push(warden_policy::Condition {
            kind: warden_policy::ConditionKind::Unknown,
            escalate_on_fail: false,
        });

        let outcome = engine().evaluate(&policy, &request("model", "search_web"));
        assert_eq!(outcome.verdict, Verdict::Deny);
        assert!(outcome
            .reason_trace
            .iter()
            .any(|s| s.role == ReasonRole::DegradedPolicy));
    }

    #[test]
    fn malformed_request_degrades_to_deny() {
        let policy = policy_from("", "permissive");
        let mut req = request("model", "search_web");
        req.actor_id = String::new();
        let outcome = engine().evaluate(&policy, &req);
        assert_eq!(outcome.verdict, Verdict::Deny);
    }

    proptest::proptest! {
        /// Evaluation is a pure function: identical inputs, identical outcome.
        #[test]
        fn evaluation_is_deterministic(
            actor in proptest::sample::select(vec!["model", "ops_bot", "ghost"]),
            action in proptest::sample::select(vec!["search_web", "compose_email", "send_email"]),
            risk in proptest::option::of(1u8..=5),
        ) {
            let policy = policy_from(
                r#"{"type": "permits", "id": "p1", "actor": "model", "action": "search_web"},
                   {"type": "forbids", "id": "f1", "actor": "*", "action": "send_email", "reason": "no outbound"},
                   {"type": "implies", "id": "i1", "action": "compose_email", "implied_action": "send_email"}"#,
                "strict",
            );
            let mut req = request(actor, action);
            req.risk_level = risk;

            let a = engine().evaluate(&policy, &req);
            let b = engine().evaluate(&policy, &req);
            proptest::prop_assert_eq!(a, b);
        }
    }
}
