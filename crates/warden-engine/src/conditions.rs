use chrono::{Datelike, FixedOffset, Timelike};

use warden_core::decision::{ReasonRole, ReasonStep};
use warden_core::request::DecisionRequest;
use warden_policy::conditions::{Condition, ConditionKind};
use warden_policy::Policy;

use crate::traits::{ApprovalVerifier, RateLimitObserver};

/// Everything condition evaluation may consult besides the request itself.
/// All of it is an input: the engine reads no clock, RNG, or ambient state.
pub(crate) struct CondEnv<'a> {
    pub policy: &'a Policy,
    pub rate: &'a dyn RateLimitObserver,
    pub approvals: &'a dyn ApprovalVerifier,
}

/// Evaluate one condition for `req` with `action_id` as the action under
/// evaluation (differs from `req.action_id` inside an implies expansion).
///
/// Unknown condition types push a `degraded_policy` step and evaluate false;
/// they never silently permit. Every other failure mode is fail-closed too:
/// a missing context field, a term without the referenced attribute, or an
/// unrepresentable timestamp all yield false.
pub(crate) fn condition_holds(
    env: &CondEnv<'_>,
    req: &DecisionRequest,
    action_id: &str,
    rule_id: &str,
    cond: &Condition,
    trace: &mut Vec<ReasonStep>,
) -> bool {
    match &cond.kind {
        ConditionKind::TimeWindow {
            start_minute,
            end_minute,
            tz_offset_minutes,
            days,
        } => in_time_window(
            req.wall_clock_us,
            *start_minute,
            *end_minute,
            *tz_offset_minutes,
            days,
        ),

        ConditionKind::RateLimit {
            key_selector,
            max,
            window_secs: _,
        } => match rate_key(key_selector, req, action_id) {
            Some(key) => env.rate.observe(&key) < *max,
            None => false,
        },

        ConditionKind::ApprovalPresent { approver_role } => {
            let key = format!("approval:{approver_role}");
            match req.context.get(&key).and_then(|v| v.as_str()) {
                Some(token_hex) => env.approvals.approval_valid(
                    &req.tenant_id,
                    &req.actor_id,
                    action_id,
                    approver_role,
                    token_hex,
                ),
                None => false,
            }
        }

        ConditionKind::ContextEquals { field, value } => {
            req.context.get(field) == Some(value)
        }

        ConditionKind::ContextIn { field, values } => match req.context.get(field) {
            Some(v) => values.contains(v),
            None => false,
        },

        ConditionKind::DataSensitivityAtMost { limit } => req
            .data_class
            .as_deref()
            .and_then(|dc| env.policy.data_sensitivity(dc))
            .is_some_and(|s| s <= *limit),

        ConditionKind::ActorTrustAtLeast { limit } => env
            .policy
            .actor_trust(&req.actor_id)
            .is_some_and(|t| t >= *limit),

        ConditionKind::Unknown => {
            trace.push(ReasonStep::with_detail(
                rule_id,
                ReasonRole::DegradedPolicy,
                "unknown condition type",
            ));
            false
        }
    }
}

/// The counter key a `rate_limit` selector resolves to, always qualified by
/// tenant. `context:<field>` selectors resolve through the request context;
/// a missing field means no key and the condition fails.
fn rate_key(selector: &str, req: &DecisionRequest, action_id: &str) -> Option<String> {
    let value = match selector {
        "actor" => req.actor_id.clone(),
        "action" => action_id.to_string(),
        "tenant" => String::new(),
        _ => {
            let field = selector.strip_prefix("context:")?;
            req.context.get(field)?.to_string()
        }
    };
    Some(format!("{}:{selector}:{value}", req.tenant_id))
}

fn in_time_window(
    wall_clock_us: i64,
    start_minute: u16,
    end_minute: u16,
    tz_offset_minutes: i32,
    days: &std::collections::BTreeSet<u8>,
) -> bool {
    let Some(utc) = chrono::DateTime::from_timestamp_micros(wall_clock_us) else {
        return false;
    };
    let Some(offset) = FixedOffset::east_opt(tz_offset_minutes * 60) else {
        return false;
    };
    let local = utc.with_timezone(&offset);

    if !days.contains(&(local.weekday().number_from_monday() as u8)) {
        return false;
    }

    let minute = (local.hour() * 60 + local.minute()) as u16;
    if start_minute <= end_minute {
        minute >= start_minute && minute <= end_minute
    } else {
        // Window wraps midnight.
        minute >= start_minute || minute <= end_minute
    }
}
