/// Hard upper bound on capability-token TTL (30 minutes). Policies may set a
/// shorter `default_token_ttl`; the loader rejects anything above this.
pub const MAX_TOKEN_TTL_SECS: u32 = 30 * 60;

/// Escalation threshold applied when a policy document does not set one:
/// an Allow with `request.risk_level >= 4` is raised to Escalate.
pub const DEFAULT_ESCALATION_THRESHOLD: u8 = 4;

/// Maximum canonical size of a request's context map (64 KiB).
pub const MAX_CONTEXT_BYTES: usize = 64 * 1024;

/// Maximum length of any warden identifier (tenant, actor, action, ...).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// How long a decision response is retained for request_id replay (10 min).
pub const IDEMPOTENCY_RETENTION_SECS: i64 = 10 * 60;

/// Default bound on queued append-lock waiters per tenant before new
/// decisions are rejected with Unavailable.
pub const DEFAULT_APPEND_WAITERS_MAX: usize = 64;

/// Tenant chain that receives control-plane events (policy_loaded).
pub const SYSTEM_TENANT: &str = "system";

/// Microseconds per second, for ingress scaling.
pub const MICROS_PER_SEC: i64 = 1_000_000;
