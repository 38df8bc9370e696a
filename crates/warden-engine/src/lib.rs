mod conditions;
pub mod engine;
pub mod traits;

pub use engine::PolicyEngine;
pub use traits::{
    standard_rate_keys, ApprovalVerifier, NoApprovals, RateLimitObserver, ZeroCounts,
};
