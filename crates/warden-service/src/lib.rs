pub mod approvals;
pub mod counters;
pub mod idempotency;
pub mod service;
pub mod token;
pub mod validate;

pub use approvals::{issue_approval, RoleApprovals};
pub use counters::MemoryCounters;
pub use service::DecisionService;
pub use token::{mint_token, verify_token_wire};
pub use validate::DecideInput;
