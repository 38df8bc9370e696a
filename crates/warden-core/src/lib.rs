pub mod constants;
pub mod decision;
pub mod entry;
pub mod error;
pub mod request;
pub mod token;
pub mod types;

pub use constants::*;
pub use decision::{DecisionResponse, EvaluationOutcome, ReasonRole, ReasonStep, Verdict};
pub use entry::{
    AppendReceipt, DecisionPayload, EventType, LedgerEntry, LedgerTail, PolicyLoadedPayload,
    VerifyFailure, VerifyFailureReason, VerifyReport,
};
pub use error::{ErrorKind, WardenError};
pub use request::{ContextValue, DecisionRequest, Principal};
pub use token::{CapabilityToken, TokenVerification};
pub use types::*;
