pub mod reader;
pub mod records;
pub mod writer;

pub use reader::{CanonicalReader, CodecError};
pub use records::{
    decode_decision_payload, decode_entry_body, decode_policy_loaded_payload, decode_token_wire,
    encode_approval_claim, encode_context, encode_decision_payload, encode_entry_body,
    encode_policy_loaded_payload,
    encode_reason_trace, encode_request, encode_token_body, encode_token_body_fields,
    encode_token_wire, put_context_value, DecodedToken, EntryBody,
};
pub use writer::CanonicalWriter;
