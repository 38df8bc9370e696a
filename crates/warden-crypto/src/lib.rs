pub mod hash;
pub mod keyring;
pub mod signer;

pub use hash::{chain_hash, policy_version_hash, request_digest, sha256, token_id_from_body};
pub use keyring::{KeyRing, KeyRingEntry};
pub use signer::{verify_signature, NodeSigner, SignerError};
