pub mod conditions;
pub mod document;
pub mod loader;
pub mod model;
pub mod relations;
pub mod terms;

pub use conditions::{Condition, ConditionKind};
pub use document::{parse_json, PolicyDocument};
pub use loader::{load_document, LoadWarning, LoadedPolicy};
pub use model::{ActivePolicy, Policy, PolicyMode};
pub use relations::{triple_matches, Forbid, Implication, Pattern, Permit, Require};
pub use terms::{Term, TermKind};
