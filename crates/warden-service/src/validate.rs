use std::collections::BTreeMap;

use warden_core::constants::{MAX_CONTEXT_BYTES, MAX_TOKEN_TTL_SECS};
use warden_core::error::WardenError;
use warden_core::request::{ContextValue, DecisionRequest, Principal};
use warden_core::types::{is_valid_identifier, TimestampUs};

/// The external request as received at the service boundary, before
/// validation. Unknown wire fields are rejected one layer up, at the DTO.
#[derive(Clone, Debug, Default)]
pub struct DecideInput {
    pub request_id: Option<String>,
    pub actor_id: String,
    pub action_id: String,
    pub resource_id: Option<String>,
    pub data_class: Option<String>,
    pub context: BTreeMap<String, ContextValue>,
    pub risk_level: Option<u8>,
    /// TTL the caller asks for; the minted token gets
    /// `min(requested, policy default)`.
    pub requested_ttl_secs: Option<u32>,
}

fn check_identifier(field: &'static str, value: &str) -> Result<(), WardenError> {
    if is_valid_identifier(value) {
        return Ok(());
    }
    Err(WardenError::InvalidIdentifier {
        field,
        value: value.to_string(),
    })
}

/// Validate an external request into the canonical `DecisionRequest`,
/// freezing `now_us` as the request's wall clock. A missing `request_id`
/// gets a generated UUIDv4.
pub fn validate(
    input: &DecideInput,
    principal: &Principal,
    now_us: TimestampUs,
) -> Result<DecisionRequest, WardenError> {
    if principal.tenant_id.is_empty() {
        return Err(WardenError::MissingPrincipal);
    }
    check_identifier("tenant_id", &principal.tenant_id)?;

    if input.actor_id.is_empty() {
        return Err(WardenError::MissingField("actor_id"));
    }
    check_identifier("actor_id", &input.actor_id)?;

    if input.action_id.is_empty() {
        return Err(WardenError::MissingField("action_id"));
    }
    check_identifier("action_id", &input.action_id)?;

    if let Some(resource_id) = &input.resource_id {
        check_identifier("resource_id", resource_id)?;
    }
    if let Some(data_class) = &input.data_class {
        check_identifier("data_class", data_class)?;
    }

    if let Some(risk) = input.risk_level {
        if !(1..=5).contains(&risk) {
            return Err(WardenError::RiskLevelOutOfRange(risk));
        }
    }

    if let Some(ttl) = input.requested_ttl_secs {
        if ttl == 0 || ttl > MAX_TOKEN_TTL_SECS {
            return Err(WardenError::RequestedTtlOutOfRange {
                max: MAX_TOKEN_TTL_SECS,
                got: ttl,
            });
        }
    }

    for key in input.context.keys() {
        if key.is_empty() || key.len() > warden_core::constants::MAX_IDENTIFIER_LEN {
            return Err(WardenError::InvalidIdentifier {
                field: "context key",
                value: key.clone(),
            });
        }
    }
    let context_bytes = warden_codec::encode_context(&input.context).len();
    if context_bytes > MAX_CONTEXT_BYTES {
        return Err(WardenError::ContextTooLarge {
            max: MAX_CONTEXT_BYTES,
            got: context_bytes,
        });
    }

    let request_id = match &input.request_id {
        Some(id) => {
            check_identifier("request_id", id)?;
            id.clone()
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    Ok(DecisionRequest {
        request_id,
        tenant_id: principal.tenant_id.clone(),
        actor_id: input.actor_id.clone(),
        action_id: input.action_id.clone(),
        resource_id: input.resource_id.clone(),
        data_class: input.data_class.clone(),
        context: input.context.clone(),
        risk_level: input.risk_level,
        wall_clock_us: now_us,
    })
}
