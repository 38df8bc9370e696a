use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    // ── Request validation ───────────────────────────────────────────────────
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("risk_level out of range 1..=5: {0}")]
    RiskLevelOutOfRange(u8),

    #[error("context map exceeds {max} canonical bytes (got {got})")]
    ContextTooLarge { max: usize, got: usize },

    #[error("requested ttl {got}s outside 1..={max}s")]
    RequestedTtlOutOfRange { max: u32, got: u32 },

    // ── Idempotency ──────────────────────────────────────────────────────────
    #[error("request_id replayed with a different request digest")]
    IdempotencyDigestMismatch,

    // ── Policy loading ───────────────────────────────────────────────────────
    #[error("duplicate term id within kind {kind}: {id}")]
    DuplicateTerm { kind: &'static str, id: String },

    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("rule {rule_id} references unknown {kind} term: {id}")]
    UnknownTerm {
        rule_id: String,
        kind: &'static str,
        id: String,
    },

    #[error("rule {rule_id} has malformed condition: {detail}")]
    MalformedCondition { rule_id: String, detail: String },

    #[error("default_token_ttl must be in 1..={max} seconds; got {got}")]
    TokenTtlOutOfBounds { max: u32, got: u32 },

    #[error("implies rule {0} forms a self-loop")]
    ImpliesSelfLoop(String),

    #[error("policy document parse error: {0}")]
    PolicyParse(String),

    // ── Ledger ───────────────────────────────────────────────────────────────
    #[error("ledger entry not found: tenant {tenant}, seq {seq}")]
    EntryNotFound { tenant: String, seq: u64 },

    #[error("ledger append backpressure: {waiters} waiters queued for tenant {tenant}")]
    AppendBackpressure { tenant: String, waiters: usize },

    #[error("ledger tail corrupt for tenant {0}")]
    TailCorrupt(String),

    // ── Signer ───────────────────────────────────────────────────────────────
    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("no verification key valid at timestamp {0}")]
    NoKeyForTimestamp(i64),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("canonical encoding error: {0}")]
    Canonical(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── Service ──────────────────────────────────────────────────────────────
    #[error("deadline exceeded before the decision was committed")]
    DeadlineExceeded,

    #[error("missing principal")]
    MissingPrincipal,

    #[error("internal integrity failure: {0}")]
    Integrity(String),
}

/// The fixed error kinds surfaced at the wire boundary. Everything a caller
/// can observe maps onto one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Conflict,
    Unavailable,
    Timeout,
    Unauthorized,
    Internal,
}

impl WardenError {
    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        use WardenError::*;
        match self {
            MissingField(_)
            | InvalidIdentifier { .. }
            | RiskLevelOutOfRange(_)
            | ContextTooLarge { .. }
            | RequestedTtlOutOfRange { .. } => ErrorKind::InvalidRequest,
            IdempotencyDigestMismatch => ErrorKind::Conflict,
            AppendBackpressure { .. } => ErrorKind::Unavailable,
            DeadlineExceeded => ErrorKind::Timeout,
            MissingPrincipal => ErrorKind::Unauthorized,
            _ => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}
