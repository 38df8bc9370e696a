use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

use warden_core::types::{Ed25519PublicKey, Ed25519Signature};

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid seed length: expected 32, got {0}")]
    InvalidSeedLength(usize),

    #[error("invalid public key bytes")]
    InvalidPublicKey,
}

/// The node's signing identity: one Ed25519 keypair held in memory.
///
/// The secret seed is wiped on drop. Key material at rest is encrypted by an
/// out-of-band mechanism; this type only consumes a loaded seed. Signing
/// never logs its input or the key.
pub struct NodeSigner {
    signing: SigningKey,
}

impl NodeSigner {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    /// Restore a signer from a 32-byte seed (e.g. loaded from the key file).
    pub fn from_seed_bytes(seed: &[u8]) -> Result<Self, SignerError> {
        if seed.len() != 32 {
            return Err(SignerError::InvalidSeedLength(seed.len()));
        }
        let mut arr = Zeroizing::new([0u8; 32]);
        arr.copy_from_slice(seed);
        Ok(Self {
            signing: SigningKey::from_bytes(&arr),
        })
    }

    /// Detached signature over `message`. Infallible with a loaded key; key
    /// loading is where failures surface.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing.sign(message);
        Ed25519Signature(sig.to_bytes().to_vec())
    }

    /// The verification key to publish.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Expose the seed for key-file persistence (keygen only).
    pub fn seed_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }
}

impl std::fmt::Debug for NodeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeSigner {{ public_key: {:?} }}", self.public_key())
    }
}

/// Verify a detached Ed25519 signature. Never panics: malformed keys or
/// signatures verify as `false`.
pub fn verify_signature(
    public_key: &Ed25519PublicKey,
    message: &[u8],
    signature: &Ed25519Signature,
) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.0.as_slice()) else {
        return false;
    };
    let sig = Signature::from_bytes(&sig_bytes);
    vk.verify_strict(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let signer = NodeSigner::generate();
        let message = b"decision entry hash";
        let sig = signer.sign(message);
        assert!(verify_signature(&signer.public_key(), message, &sig));
    }

    #[test]
    fn tampered_message_fails() {
        let signer = NodeSigner::generate();
        let sig = signer.sign(b"original");
        assert!(!verify_signature(&signer.public_key(), b"tampered", &sig));
    }

    #[test]
    fn malformed_inputs_return_false() {
        let signer = NodeSigner::generate();
        let sig = signer.sign(b"msg");
        let bad_sig = Ed25519Signature(vec![0u8; 10]);
        assert!(!verify_signature(&signer.public_key(), b"msg", &bad_sig));
        let bad_key = Ed25519PublicKey([0xffu8; 32]);
        assert!(!verify_signature(&bad_key, b"msg", &sig));
    }

    #[test]
    fn seed_round_trip_preserves_identity() {
        let signer = NodeSigner::generate();
        let restored = NodeSigner::from_seed_bytes(signer.seed_bytes().as_ref()).unwrap();
        assert_eq!(signer.public_key(), restored.public_key());
    }
}
